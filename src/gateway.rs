use anyhow::Result;
use async_trait::async_trait;

/// One inbound command from the transport. `sender` is an opaque identifier;
/// the core never interprets it beyond using it as the account key.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
}

/// Outbound side of the messaging transport. Real transports (XMTP, Telegram,
/// Discord, ...) implement this; delivery failure is the caller's to log and
/// is never fatal to monitoring.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Development transport: replies and notifications go to stdout.
pub struct ConsoleGateway;

#[async_trait]
impl MessagingGateway for ConsoleGateway {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        println!("-> [{recipient}]\n{text}\n");
        Ok(())
    }
}
