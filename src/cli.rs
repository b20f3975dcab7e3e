use crate::config::AppConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/globe.json";

const USAGE: &str = "Supported flags: --width, --height, --vsync, --tiles, --catalog, --media-root, --config.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    tiles: Option<usize>,
    catalog: Option<PathBuf>,
    media_root: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // program name
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. {USAGE}");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => overrides.vsync = Some(parse_bool_flag("vsync", &value)?),
                "tiles" => {
                    let tiles =
                        value.parse::<usize>().with_context(|| format!("Invalid tile count '{value}'"))?;
                    if tiles == 0 {
                        bail!("--tiles must be at least 1");
                    }
                    overrides.tiles = Some(tiles);
                }
                "catalog" => overrides.catalog = Some(parse_path("catalog", value)?),
                "media-root" => overrides.media_root = Some(parse_path("media-root", value)?),
                "config" => overrides.config = Some(parse_path("config", value)?),
                _ => bail!("Unknown flag '{flag}'. {USAGE}"),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn into_config_overrides(self) -> AppConfigOverrides {
        AppConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            tile_count: self.tiles,
            catalog: self.catalog,
            media_root: self.media_root,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

fn parse_path(flag: &str, value: String) -> Result<PathBuf> {
    if value.trim().is_empty() {
        bail!("--{flag} needs a non-empty path");
    }
    Ok(PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_flags() {
        let args = ["globe", "--width", "1600", "--height", "900", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides").into_config_overrides();
        assert_eq!((overrides.width, overrides.height, overrides.vsync), (Some(1600), Some(900), Some(false)));
        assert!(overrides.tile_count.is_none());
    }

    #[test]
    fn parses_media_flags() {
        let args = ["globe", "--tiles", "12", "--catalog", "a/list.json", "--media-root", "a", "--config", "c.json"];
        let cli = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(cli.config_path(), PathBuf::from("c.json"));
        let overrides = cli.into_config_overrides();
        assert_eq!(overrides.tile_count, Some(12));
        assert_eq!(overrides.catalog, Some(PathBuf::from("a/list.json")));
        assert_eq!(overrides.applied_fields(), vec!["tiles", "catalog", "media-root"]);
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["globe", "--width", "800", "--width", "1920", "--vsync", "on", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides").into_config_overrides();
        assert_eq!((overrides.width, overrides.vsync), (Some(1920), Some(false)));
    }

    #[test]
    fn config_path_defaults() {
        let cli = CliOverrides::parse(["globe"]).expect("parse");
        assert_eq!(cli.config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.into_config_overrides().is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        let err = CliOverrides::parse(["globe", "--width"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"));
        let err = CliOverrides::parse(["globe", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"));
        assert!(CliOverrides::parse(["globe", "--tiles", "0"]).is_err());
        assert!(CliOverrides::parse(["globe", "tiles"]).is_err());
    }
}
