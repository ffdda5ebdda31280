use std::{
    borrow::Cow,
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
};

pub trait ConfigLoaderObject {
    fn key(&self) -> Cow<'static, str>;

    fn save(&self) -> eyre::Result<serde_json::Value>;
    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<HashMap<Cow<'static, str>, serde_json::Value>>>,
}

impl ConfigLoader {
    pub async fn read(path: &Path) -> eyre::Result<Self> {
        let mut file = tokio::fs::File::open(&path).await?;

        let mut buf = String::new();
        let _size = file.read_to_string(&mut buf).await?;

        let config = serde_json::from_str(&buf)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Like [`ConfigLoader::read`], but a missing file is an empty config.
    pub async fn read_or_default(path: &Path) -> eyre::Result<Self> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::read(path).await,
            Ok(false) => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> eyre::Result<()> {
        let config = self.config.read().await;

        let data = serde_json::to_vec_pretty(&*config)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&data).await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %object.key()))]
    pub async fn save_object<T>(&self, object: &T) -> eyre::Result<()>
    where
        T: ConfigLoaderObject,
    {
        tracing::debug!("saving object data");

        let data = object.save()?;
        self.config.write().await.insert(object.key(), data);

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %object.key()))]
    pub async fn restore_object<T>(&self, object: &mut T) -> eyre::Result<()>
    where
        T: ConfigLoaderObject,
    {
        tracing::debug!("loading object data");

        let data = match self.config.read().await.get(&object.key()) {
            Some(data) => data.to_owned(),
            None => {
                tracing::trace!("no data found for object");
                return Ok(());
            }
        };

        object.restore(data)?;

        Ok(())
    }
}

pub(crate) fn default_config_path() -> PathBuf {
    match directories::ProjectDirs::from("net", "huefox", "qr-scanner") {
        Some(dirs) => dirs.config_dir().join("config.json"),
        None => PathBuf::from("qr-scanner.json"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SourceConfig {
    Camera {
        device: PathBuf,
        width: u32,
        height: u32,
        fps: u32,
        format: String,
    },
    Still {
        path: PathBuf,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Camera {
            device: PathBuf::from("/dev/video0"),
            width: 640,
            height: 480,
            fps: 30,
            format: "MJPG".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum DecoderConfig {
    Rqrr,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ScannerConfig {
    pub(crate) log_path: PathBuf,
    pub(crate) ticks_per_second: u32,
    pub(crate) preload_seen: bool,
    pub(crate) source: SourceConfig,
    pub(crate) decoders: Vec<DecoderConfig>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("scanned_qr_codes.txt"),
            ticks_per_second: 30,
            preload_seen: false,
            source: SourceConfig::default(),
            decoders: vec![DecoderConfig::Rqrr],
        }
    }
}

impl ScannerConfig {
    pub(crate) fn tick_period(&self) -> eyre::Result<Duration> {
        eyre::ensure!(
            self.ticks_per_second > 0,
            "ticks_per_second must be greater than zero"
        );

        Ok(Duration::from_secs_f64(1.0 / self.ticks_per_second as f64))
    }
}

impl ConfigLoaderObject for ScannerConfig {
    fn key(&self) -> Cow<'static, str> {
        "scanner".into()
    }

    fn save(&self) -> eyre::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::read_or_default(&dir.path().join("config.json"))
            .await
            .unwrap();

        let mut config = ScannerConfig::default();
        loader.restore_object(&mut config).await.unwrap();

        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.log_path, PathBuf::from("scanned_qr_codes.txt"));
    }

    #[tokio::test]
    async fn saved_objects_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ScannerConfig {
            preload_seen: true,
            ticks_per_second: 10,
            source: SourceConfig::Still {
                path: PathBuf::from("frame.png"),
            },
            decoders: vec![
                DecoderConfig::Command {
                    program: "ZXingReader".to_string(),
                    args: vec!["-fast".to_string()],
                },
                DecoderConfig::Rqrr,
            ],
            ..Default::default()
        };

        let loader = ConfigLoader::default();
        loader.save_object(&config).await.unwrap();
        loader.save(&path).await.unwrap();

        let reloaded = ConfigLoader::read(&path).await.unwrap();
        let mut restored = ScannerConfig::default();
        reloaded.restore_object(&mut restored).await.unwrap();

        assert_eq!(restored, config);
    }

    #[tokio::test]
    async fn partial_object_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"scanner": {"preload_seen": true, "decoders": [{"type": "command", "program": "zbarimg"}]}}"#,
        )
        .unwrap();

        let loader = ConfigLoader::read(&path).await.unwrap();
        let mut config = ScannerConfig::default();
        loader.restore_object(&mut config).await.unwrap();

        assert!(config.preload_seen);
        assert_eq!(config.ticks_per_second, 30);
        assert_eq!(
            config.decoders,
            [DecoderConfig::Command {
                program: "zbarimg".to_string(),
                args: vec![],
            }]
        );
    }

    #[test]
    fn tick_period_follows_rate() {
        let config = ScannerConfig::default();
        let period = config.tick_period().unwrap();
        assert!(period > Duration::from_millis(33) && period < Duration::from_millis(34));

        let stopped = ScannerConfig {
            ticks_per_second: 0,
            ..Default::default()
        };
        assert!(stopped.tick_period().is_err());
    }
}
