use crate::rtp::Pt;

/// Customized config for creating an [`Ingest`][crate::Ingest] pipeline.
///
/// ```
/// use webrtc_ingest::IngestConfig;
///
/// let config = IngestConfig::new()
///     .set_payload_type(102)
///     .set_bitrate_kbps(4000);
/// ```
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub(crate) payload_type: Pt,
    pub(crate) bitrate_kbps: u32,
    pub(crate) ready_token: String,
}

impl IngestConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        IngestConfig::default()
    }

    /// RTP payload type to register for the H.264 media line.
    ///
    /// Defaults to 96, the first dynamic payload type.
    pub fn set_payload_type(mut self, pt: u8) -> Self {
        self.payload_type = pt.into();
        self
    }

    /// Get the configured payload type.
    pub fn payload_type(&self) -> Pt {
        self.payload_type
    }

    /// Target receive bitrate in kbit/s, signaled to the sending side.
    ///
    /// Defaults to 9000.
    pub fn set_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    /// Get the configured target bitrate in kbit/s.
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    /// Text message the client sends on the control channel to indicate it
    /// is ready to receive the local description.
    ///
    /// Defaults to `"ready"`.
    pub fn set_ready_token(mut self, token: impl Into<String>) -> Self {
        self.ready_token = token.into();
        self
    }

    /// Get the configured readiness token.
    pub fn ready_token(&self) -> &str {
        &self.ready_token
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            payload_type: 96.into(),
            bitrate_kbps: 9000,
            ready_token: "ready".into(),
        }
    }
}
