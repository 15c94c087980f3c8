// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use serde::de::DeserializeOwned;
use std::{fs, io, path::Path};
use tracing::{debug, warn};

/// Installs the compact `tracing` formatter. `RUST_LOG` overrides the
/// default `info` filter. Calling it twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Reads a TOML config file into `T`.
///
/// A missing file yields `T::default()`. A file that fails to parse is
/// reported and also yields the defaults, so a typo never blocks startup.
pub fn load_config<T>(path: impl AsRef<Path>) -> T
where
    T: DeserializeOwned + Default,
{
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => parse_config(&text).unwrap_or_else(|e| {
            warn!("ignoring {}: {e}", path.display());
            T::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found, using defaults", path.display());
            T::default()
        }
        Err(e) => {
            warn!("could not read {}: {e}", path.display());
            T::default()
        }
    }
}

pub fn parse_config<T: DeserializeOwned>(text: &str) -> Result<T, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        frames: u32,
        name: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Sample {
                frames: 2,
                name: "vielle".into(),
            }
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg: Sample = load_config("/definitely/not/here/vielle.toml");
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let cfg: Sample = parse_config("frames = 3").unwrap();
        assert_eq!(cfg.frames, 3);
        assert_eq!(cfg.name, "vielle");
    }

    #[test]
    fn malformed_file_falls_back() {
        let path = std::env::temp_dir().join(format!("vielle-core-{}.toml", std::process::id()));
        fs::write(&path, "frames = \"three\"").unwrap();
        let cfg: Sample = load_config(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(cfg, Sample::default());
    }
}
