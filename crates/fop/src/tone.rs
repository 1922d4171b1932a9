use shared::protocol::Tone;

/// Local audio output of the platform. Displays with their own speakers rely
/// on the published `UiEvent::Tone` instead.
pub trait ToneSink: Send + Sync {
    fn play(&self, tone: Tone) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentTones;

impl ToneSink for SilentTones {
    fn play(&self, _tone: Tone) -> anyhow::Result<()> {
        Ok(())
    }
}
