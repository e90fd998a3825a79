use std::process;
use std::sync::Arc;

use anyhow::Result;

use kurt::config::parse_config;
use kurt::{Delegate, DelegateKind, Server, ServerConfig, SiteDelegate, StaticDelegate};

fn init_logging(config: &ServerConfig) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    } else if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.format_timestamp_millis().init();
}

fn build_delegate(config: &ServerConfig) -> Arc<dyn Delegate> {
    match config.delegate {
        DelegateKind::Site => match &config.site {
            Some(site) => Arc::new(SiteDelegate::new(site)),
            None => {
                log::warn!("No site file found, serving no routes");
                Arc::new(SiteDelegate::without_site())
            }
        },
        DelegateKind::Static => Arc::new(StaticDelegate::new(&config.root)),
    }
}

fn main() -> Result<()> {
    let config = parse_config()?;
    init_logging(&config);
    log::info!("Server configuration: {:?}", config);

    let server = Server::instance();
    server.set_delegate(build_delegate(&config));

    if config.dump {
        server.dispatcher().launch()?;
        print!("{}", server.dispatcher().dump());
        return Ok(());
    }

    let status = server.bind(&config.address, config.port);
    if status != 0 {
        log::error!(
            "Unable to bind to {}:{} (status {})",
            config.address,
            config.port,
            status
        );
        process::exit(status);
    }

    if log::log_enabled!(log::Level::Debug) {
        server.dispatcher().launch()?;
        log::debug!("{}", server.dispatcher().dump());
    }

    server.run()?;
    Ok(())
}
