use async_trait::async_trait;

/// Host-environment operations the attempt engine needs but does not own.
/// A browser shell backs these with the real fullscreen API; the console
/// harness ships a headless stand-in.
#[async_trait]
pub trait ProctorEnvironment: Send + Sync {
    async fn request_fullscreen(&self) -> anyhow::Result<()>;
    async fn exit_fullscreen(&self) -> anyhow::Result<()>;
    fn show_notice(&self, message: &str);
}

/// Logs every environment request instead of performing it.
pub struct HeadlessEnvironment;

#[async_trait]
impl ProctorEnvironment for HeadlessEnvironment {
    async fn request_fullscreen(&self) -> anyhow::Result<()> {
        tracing::info!("Fullscreen requested");
        Ok(())
    }

    async fn exit_fullscreen(&self) -> anyhow::Result<()> {
        tracing::info!("Fullscreen released");
        Ok(())
    }

    fn show_notice(&self, message: &str) {
        tracing::info!("Notice: {}", message);
    }
}
