use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

/// Application-level constants
pub const APP_NAME: &str = "ropscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Side length of the square classifier input.
pub const INPUT_SIZE: u32 = 224;

/// ImageNet per-channel statistics (RGB) used to train the backbone.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Heatmap weight in the overlay; the original keeps `1 - OVERLAY_ALPHA`.
pub const OVERLAY_ALPHA: f32 = 0.4;

/// Largest accepted image upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Room for multipart boundaries and headers on top of the image itself.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub const DEFAULT_MODEL_PATH: &str = "ROP_model.pth";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_PORT: u16 = 8000;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,tower_http=info")
}

/// Service configuration: command line first, then environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "ropscan", version)]
#[command(about = "Retinopathy of Prematurity screening: severity classification with Grad-CAM overlays")]
pub struct ServiceConfig {
    /// Classifier checkpoint (.pth/.pt torchvision state_dict, or .mpk)
    #[arg(long, env = "ROPSCAN_MODEL", default_value = DEFAULT_MODEL_PATH, value_name = "PATH")]
    pub model: PathBuf,

    /// Directory served under /static (must contain index.html)
    #[arg(long, env = "ROPSCAN_STATIC_DIR", default_value = DEFAULT_STATIC_DIR, value_name = "DIR")]
    pub static_dir: PathBuf,

    /// Address to bind
    #[arg(long, env = "ROPSCAN_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind
    #[arg(long, env = "ROPSCAN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn index_path(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_service() {
        let config = ServiceConfig::try_parse_from(["ropscan"]).unwrap();
        assert_eq!(config.model, PathBuf::from("ROP_model.pth"));
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.bind_addr(), "127.0.0.1:8000".parse().unwrap());
        assert_eq!(config.index_path(), PathBuf::from("static/index.html"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServiceConfig::try_parse_from([
            "ropscan",
            "--model",
            "/models/rop.mpk",
            "--host",
            "0.0.0.0",
            "--port",
            "9100",
        ])
        .unwrap();
        assert_eq!(config.model, PathBuf::from("/models/rop.mpk"));
        assert_eq!(config.bind_addr(), "0.0.0.0:9100".parse().unwrap());
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(ServiceConfig::try_parse_from(["ropscan", "--port", "70000"]).is_err());
    }

    #[test]
    fn log_filter_targets_crate_and_http() {
        assert_eq!(default_log_filter(), "ropscan=info,tower_http=info");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn normalisation_constants_are_imagenet() {
        assert_eq!(INPUT_SIZE, 224);
        assert_eq!(IMAGENET_MEAN, [0.485, 0.456, 0.406]);
        assert_eq!(IMAGENET_STD, [0.229, 0.224, 0.225]);
    }
}
