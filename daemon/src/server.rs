//! Listen-socket lifecycle and the daemon event loop.

use std::sync::Arc;

use klish_core::PluginHost;
use klish_core::Scheme;
use tokio::net::UnixListener;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;

use crate::config::Config;
use crate::scheme_file::read_scheme_files;
use crate::session::serve;

fn load_scheme(config: &Config) -> anyhow::Result<(Arc<Scheme>, Arc<PluginHost>)> {
    let ischeme = read_scheme_files(&config.scheme)?;
    let plugins = PluginHost::from_ischeme(&ischeme)?;
    let scheme = Scheme::from_ischeme(&ischeme)?;
    if scheme.find_root(&config.start_view).is_none() {
        anyhow::bail!("start view \"{}\" is not in the scheme", config.start_view);
    }
    Ok((Arc::new(scheme), Arc::new(plugins)))
}

/// Run the daemon until SIGINT/SIGTERM/SIGQUIT. SIGHUP re-reads the
/// scheme; sessions accepted afterwards see the new one, sessions in
/// flight keep the scheme they started with.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let (mut scheme, mut plugins) = load_scheme(&config)?;

    // A stale socket file from a dead daemon must not block the bind.
    if config.socket.exists() {
        let _ = std::fs::remove_file(&config.socket);
    }
    let listener = UnixListener::bind(&config.socket)
        .map_err(|e| anyhow::anyhow!("can't bind {}: {e}", config.socket.display()))?;
    tracing::info!(socket = %config.socket.display(), "listening");

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let scheme = Arc::clone(&scheme);
                        let plugins = Arc::clone(&plugins);
                        let start_view = config.start_view.clone();
                        tokio::spawn(async move {
                            serve(stream, scheme, plugins, &start_view).await;
                        });
                    }
                    Err(e) => tracing::warn!("accept failed: {e}"),
                }
            }
            _ = sighup.recv() => {
                tracing::info!("SIGHUP: reloading the scheme");
                match load_scheme(&config) {
                    Ok((new_scheme, new_plugins)) => {
                        scheme = new_scheme;
                        plugins = new_plugins;
                    }
                    Err(e) => tracing::error!("reload failed, keeping the old scheme: {e}"),
                }
            }
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            _ = sigquit.recv() => break,
        }
    }

    tracing::info!("shutting down");
    let _ = std::fs::remove_file(&config.socket);
    // Unload plugins when no session still holds them.
    if let Some(mut host) = Arc::into_inner(plugins) {
        host.fini_all();
    }
    Ok(())
}
