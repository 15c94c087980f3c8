// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use serde::Deserialize;

/// Upper bound on frames in flight a surface accepts.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub app_name: String,
    /// Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            app_name: "vielle".into(),
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub frames_in_flight: usize,
    pub present_policy: PresentPolicy,
    /// Bound on the per-frame fence wait in `begin_frame`.
    pub frame_timeout_ms: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        SurfaceConfig {
            frames_in_flight: 2,
            present_policy: PresentPolicy::Fifo,
            frame_timeout_ms: 1000,
        }
    }
}

impl SurfaceConfig {
    pub fn frame_timeout_ns(&self) -> u64 {
        self.frame_timeout_ms.saturating_mul(1_000_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentPolicy {
    /// Vsync, always available.
    #[default]
    Fifo,
    /// Vsync without queueing latency, when the driver offers it.
    Mailbox,
    /// Tearing allowed, lowest latency.
    Immediate,
}

/// Picks the requested mode when the surface offers it, else FIFO.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    policy: PresentPolicy,
) -> vk::PresentModeKHR {
    let wanted = match policy {
        PresentPolicy::Fifo => vk::PresentModeKHR::FIFO,
        PresentPolicy::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentPolicy::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if modes.contains(&wanted) {
        wanted
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub(crate) fn present_mode_name(mode: vk::PresentModeKHR) -> &'static str {
    match mode {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [vk::PresentModeKHR; 3] = [
        vk::PresentModeKHR::FIFO,
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::IMMEDIATE,
    ];

    #[test]
    fn default_policy_is_fifo_even_when_mailbox_exists() {
        assert_eq!(
            choose_present_mode(&ALL, PresentPolicy::default()),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn requested_mode_used_when_available() {
        assert_eq!(
            choose_present_mode(&ALL, PresentPolicy::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&ALL, PresentPolicy::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn unavailable_mode_falls_back_to_fifo() {
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&fifo_only, PresentPolicy::Mailbox),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn surface_config_reads_snake_case_policy() {
        let cfg: SurfaceConfig =
            toml::from_str("frames_in_flight = 3\npresent_policy = \"mailbox\"").unwrap();
        assert_eq!(cfg.frames_in_flight, 3);
        assert_eq!(cfg.present_policy, PresentPolicy::Mailbox);
        assert_eq!(cfg.frame_timeout_ms, 1000);
        assert_eq!(cfg.frame_timeout_ns(), 1_000_000_000);
    }
}
