use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::InMemoryDiagramCache,
    cleanup::CleanupService,
    config::{
        PartialSettings, Settings,
        constants::{DEFAULT_HOST, DEFAULT_PORT},
    },
    generator::Generator,
    logging::{LogConfig, LogFormat, LogLevel, configure_global_tracing},
    render::MermaidCli,
    server::{handlers::AppState, shutdown_signal, start_server},
};

#[derive(Parser, Debug)]
#[command(about = "Start the diagram rendering server")]
pub struct ServeCommand {
    #[arg(long, help = "Path to the mermaid CLI executable (mmdc)")]
    pub mermaid: Option<PathBuf>,

    #[arg(long = "in", help = "Directory for diagram source files")]
    pub input_dir: Option<PathBuf>,

    #[arg(long = "out", help = "Directory for rendered images")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Optional puppeteer config file passed to the mermaid CLI")]
    pub puppeteer: Option<PathBuf>,

    #[arg(long, help = "TOML file with renderer and cache settings")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'H',
        long,
        default_value = DEFAULT_HOST,
        help = "Host address to bind the server"
    )]
    pub host: String,

    #[arg(
        short = 'p',
        long,
        default_value_t = DEFAULT_PORT,
        help = "Port number to bind the server"
    )]
    pub port: u16,

    #[arg(long, default_value = "false", help = "Force IPv6 usage")]
    pub ipv6: bool,

    #[arg(long, help = "Seconds between cleanup sweeps [default: 300]")]
    pub cleanup_interval_secs: Option<u64>,

    #[arg(long, help = "Seconds a diagram may go unused before eviction [default: 3600]")]
    pub max_idle_secs: Option<u64>,

    #[arg(long, help = "Seconds a single render may take [default: 30]")]
    pub render_timeout_secs: Option<u64>,

    #[arg(long, help = "Seconds to wait for shutdown to complete [default: 5]")]
    pub shutdown_timeout_secs: Option<u64>,

    #[arg(
        short,
        long,
        default_value = "info",
        value_enum,
        help = "Logging level"
    )]
    pub log_level: LogLevel,

    #[arg(long, help = "Path to log file (if not specified, logs go to stdout)")]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value = "pretty", value_enum, help = "Log output format")]
    pub log_format: LogFormat,

    #[arg(
        long,
        help = "Maximum number of log files to retain (only applies if log_file is set)"
    )]
    pub log_max_files: Option<usize>,
}

impl ServeCommand {
    fn partial_settings(&self) -> PartialSettings {
        PartialSettings {
            mermaid: self.mermaid.clone(),
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            puppeteer_config: self.puppeteer.clone(),
            render_timeout_secs: self.render_timeout_secs,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            cleanup_interval_secs: self.cleanup_interval_secs,
            max_idle_secs: self.max_idle_secs,
        }
    }

    /// Settings file first, command line on top.
    pub fn settings(&self) -> Result<Settings, Box<dyn std::error::Error + Send + Sync>> {
        let base = match &self.config {
            Some(path) => PartialSettings::load(path)?,
            None => PartialSettings::default(),
        };
        Ok(base.merge(self.partial_settings()).resolve()?)
    }

    fn print_banner(&self, settings: &Settings) {
        println!();
        println!("╔═══════════════════════════════════════════════╗");
        println!(
            "║         Mermaid Diagram Server v{}         ║",
            env!("CARGO_PKG_VERSION")
        );
        println!("╚═══════════════════════════════════════════════╝");
        println!();
        println!("Configuration:");
        println!("  → Host: {}", self.host);
        println!("  → Port: {}", self.port);
        println!("  → IPv6: {}", self.ipv6);
        println!("  → Log Level: {:?}", self.log_level);
        println!("  → Log Format: {:?}", self.log_format);

        if let Some(ref file) = self.log_file {
            println!("  → Log File: {}", file.display());
        }

        println!();
        println!("Renderer:");
        println!("  → Mermaid CLI: {}", settings.mermaid.display());
        println!("  → Input Dir: {}", settings.input_dir.display());
        println!("  → Output Dir: {}", settings.output_dir.display());
        match settings.puppeteer_config {
            Some(ref config) => println!("  → Puppeteer Config: {}", config.display()),
            None => println!("  → Puppeteer Config: ✗ None"),
        }
        println!("  → Render Timeout: {}s", settings.render_timeout_secs);
        println!();
        println!("Cache:");
        println!("  → Cleanup Interval: {}s", settings.cleanup.interval_secs);
        println!("  → Max Idle: {}s", settings.cleanup.max_idle_secs);
        println!();
    }

    pub async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let log_config = LogConfig {
            level: self.log_level,
            format: self.log_format,
            file_path: self.log_file.clone(),
            max_log_files: self.log_max_files,
        };
        let _log_guard = configure_global_tracing(log_config)?;

        let settings = self.settings()?;
        settings.prepare_directories()?;
        self.print_banner(&settings);

        if !settings.mermaid.exists() {
            tracing::warn!(
                "Mermaid CLI not found at {}, renders will fail until it is installed",
                settings.mermaid.display()
            );
        }

        let renderer = MermaidCli::new(&settings.mermaid, settings.render_timeout());
        let generator = Arc::new(Generator::new(
            Arc::new(InMemoryDiagramCache::new()),
            Arc::new(renderer),
            settings.render_paths(),
        ));

        let cleanup = CleanupService::new(generator.clone(), settings.cleanup).start();

        let shutdown = CancellationToken::new();
        let mut server_handle = tokio::spawn(start_server(
            self.host.clone(),
            self.port,
            self.ipv6,
            AppState::new(generator),
            shutdown.clone(),
        ));

        let mut result = Ok(());
        tokio::select! {
            joined = &mut server_handle => {
                result = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        tracing::error!("Server failed: {}", e);
                        Err(e)
                    }
                    Err(e) => {
                        tracing::error!("Server panicked: {:?}", e);
                        Err(e.into())
                    }
                };
            }
            _ = shutdown_signal() => {
                tracing::info!("Shutting down...");
            }
        }

        shutdown.cancel();
        let grace = settings.shutdown_timeout();

        if !server_handle.is_finished()
            && tokio::time::timeout(grace, &mut server_handle).await.is_err()
        {
            tracing::warn!(
                grace_secs = settings.shutdown_timeout_secs,
                "Server did not drain in time, aborting open connections"
            );
            server_handle.abort();
        }

        if !cleanup.shutdown(grace).await {
            tracing::warn!("Cleanup loop did not stop cleanly");
        }

        tracing::info!("Shutdown complete");
        result
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn parse(args: &[&str]) -> ServeCommand {
        let mut argv = vec!["serve"];
        argv.extend_from_slice(args);
        ServeCommand::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cmd = parse(&["--mermaid", "/usr/bin/mmdc", "--in", "/tmp/in", "--out", "/tmp/out"]);

        assert_eq!(cmd.host, "0.0.0.0");
        assert_eq!(cmd.port, 80);
        assert!(!cmd.ipv6);
        assert_eq!(cmd.log_level, LogLevel::Info);

        let settings = cmd.settings().unwrap();
        assert_eq!(settings.input_dir, PathBuf::from("/tmp/in"));
        assert_eq!(settings.cleanup.interval_secs, 300);
        assert_eq!(settings.cleanup.max_idle_secs, 3600);
    }

    #[test]
    fn missing_mermaid_is_an_error() {
        let cmd = parse(&["--in", "/tmp/in", "--out", "/tmp/out"]);
        let err = cmd.settings().unwrap_err();
        assert_eq!(err.to_string(), "missing required argument `mermaid`");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mermaid.toml");
        std::fs::write(
            &path,
            "mermaid = \"/opt/mmdc\"\ninput_dir = \"/srv/in\"\noutput_dir = \"/srv/out\"\nmax_idle_secs = 120\n",
        )
        .unwrap();

        let cmd = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--out",
            "/var/out",
            "--puppeteer",
            "/etc/puppeteer.json",
        ]);
        let settings = cmd.settings().unwrap();

        assert_eq!(settings.mermaid, PathBuf::from("/opt/mmdc"));
        assert_eq!(settings.output_dir, PathBuf::from("/var/out"));
        assert_eq!(
            settings.puppeteer_config,
            Some(PathBuf::from("/etc/puppeteer.json"))
        );
        assert_eq!(settings.cleanup.max_idle_secs, 120);
    }
}
