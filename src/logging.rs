//! Logger setup.
//!
//! With `debug` enabled, records go to the bridge log file (by default `bridge.log` in the base
//! directory) at debug level. Otherwise the usual `RUST_LOG` environment filter applies and
//! records go to stderr. Only the first initialization in a process takes effect.

use crate::config::BridgeConfig;
use std::fs::File;
use std::io::Write;

pub fn init(config: &BridgeConfig) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));

    if config.debug {
        let path = config.log_path();
        match File::create(&path) {
            Ok(file) => {
                builder
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .format(|buf, record| {
                        writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
                    });
            }
            Err(e) => eprintln!("webview-bridge: cannot open log file {}: {e}", path.display()),
        }
    }

    // A logger installed by the host (or an earlier bridge) wins.
    let _ = builder.try_init();
}
