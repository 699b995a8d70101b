use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "echolens_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per line instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

/// Returned by [`init_telemetry`]; reports what was installed.
#[derive(Debug)]
pub struct TelemetryGuard {
    filter: String,
    installed: bool,
}

impl TelemetryGuard {
    /// The filter directive in effect.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// False if a global subscriber was already set (e.g. by a test harness).
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Build the filter directive string from config.
pub fn filter_directive(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter_str
}

/// Parse a `target=level` override, as given on the command line.
pub fn parse_module_level(arg: &str) -> Result<(String, Level), String> {
    let (module, level) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected target=level, got {arg:?}"))?;
    let module = module.trim();
    if module.is_empty() {
        return Err(format!("missing target in {arg:?}"));
    }
    let level = level
        .trim()
        .parse::<Level>()
        .map_err(|e| format!("bad level in {arg:?}: {e}"))?;
    Ok((module.to_string(), level))
}

/// The filtered fmt layer, writing to `writer`.
pub fn fmt_layer<S, W>(json: bool, writer: W, filter: EnvFilter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
///
/// Logs go to stderr. Stdout belongs to command output.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let directive = filter_directive(&config);
    let (env_filter, filter) = match EnvFilter::try_from_default_env() {
        Ok(f) => {
            let s = f.to_string();
            (f, s)
        }
        Err(_) => (EnvFilter::new(&directive), directive),
    };

    let layer = fmt_layer(config.json, std::io::stderr, env_filter);

    let installed = match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => true,
        Err(e) => {
            eprintln!("echolens-telemetry: subscriber already set: {e}");
            false
        }
    };

    TelemetryGuard { filter, installed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn module_level_parsing() {
        assert_eq!(
            parse_module_level("echolens_llm=debug"),
            Ok(("echolens_llm".to_string(), Level::DEBUG))
        );
        assert_eq!(
            parse_module_level(" hyper = WARN "),
            Ok(("hyper".to_string(), Level::WARN))
        );
        assert!(parse_module_level("echolens_llm").is_err());
        assert!(parse_module_level("=debug").is_err());
        assert!(parse_module_level("echolens_llm=loud").is_err());
    }

    #[test]
    fn records_go_to_the_given_writer() {
        let out = Captured::default();
        let subscriber =
            tracing_subscriber::registry().with(fmt_layer(true, out.clone(), EnvFilter::new("info")));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(frames = 3, "relayed");
            tracing::debug!("hidden");
        });

        let text = out.contents();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains(r#""message":"relayed""#));
        assert!(text.contains(r#""frames":3"#));
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn default_directive_is_info() {
        assert_eq!(filter_directive(&TelemetryConfig::default()), "info");
    }

    #[test]
    fn module_overrides_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("echolens_engine".into(), Level::DEBUG),
                ("echolens_llm".into(), Level::TRACE),
            ],
            json: true,
        };
        assert_eq!(
            filter_directive(&config),
            "warn,echolens_engine=debug,echolens_llm=trace"
        );
    }
}
