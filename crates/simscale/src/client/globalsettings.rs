use std::path::{Path, PathBuf};

use crate::client::lastrun::{LastRun, last_run_path, load_last_run};
use crate::client::output::outputs::Output;
use crate::common::config::{ReconnectConfig, SimScaleConfig, load_config};

pub struct GlobalSettings {
    config_path: PathBuf,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(config_path: PathBuf, printer: Box<dyn Output>) -> Self {
        GlobalSettings {
            config_path,
            printer,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load_config(&self) -> crate::Result<SimScaleConfig> {
        load_config(&self.config_path)
    }

    /// Reconnection settings. The loop runs without a config file, using defaults.
    pub fn reconnect_config(&self) -> crate::Result<ReconnectConfig> {
        if !self.config_path.exists() {
            log::debug!(
                "Config file {} does not exist, using default reconnection settings",
                self.config_path.display()
            );
            return Ok(ReconnectConfig::default());
        }
        Ok(self.load_config()?.reconnect)
    }

    pub fn last_run_path(&self) -> PathBuf {
        last_run_path(&self.config_path)
    }

    pub fn last_run(&self) -> crate::Result<LastRun> {
        load_last_run(self.last_run_path())
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use crate::client::globalsettings::GlobalSettings;
    use crate::client::output::quiet::Quiet;
    use crate::tests::utils::MINIMAL_CONFIG;

    #[test]
    fn reconnect_defaults_without_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let gsettings =
            GlobalSettings::new(dir.path().join("simscale.toml"), Box::new(Quiet));
        let config = gsettings.reconnect_config().unwrap();
        assert_eq!(config.max_retries, 10);
        assert!(gsettings.load_config().is_err());
    }

    #[test]
    fn reconnect_section_from_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("simscale.toml");
        std::fs::write(
            &path,
            format!("{MINIMAL_CONFIG}\n[reconnect]\nmax_retries = 4\n"),
        )
        .unwrap();
        let gsettings = GlobalSettings::new(path, Box::new(Quiet));
        assert_eq!(gsettings.reconnect_config().unwrap().max_retries, 4);
        assert_eq!(
            gsettings.last_run_path(),
            dir.path().join("last-run.json")
        );
    }
}
