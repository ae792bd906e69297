//! Non-interactive modes: `-c` command lines or a script piped on stdin.

use std::io::Write;

use crate::session::ClientEvent;
use crate::session::ClientSession;
use crate::tty;

/// Authenticate, run the given lines in order, return the retcode of the
/// last one (commands after a failing one still run, like a shell
/// script).
pub async fn run_commands(
    session: &mut ClientSession,
    lines: &[String],
    dry_run: bool,
) -> anyhow::Result<i32> {
    session.auth(tty::tty_status()).await?;
    // Wait for the handshake to finish.
    loop {
        match session.next().await {
            None => anyhow::bail!("daemon closed the connection during auth"),
            Some(ClientEvent::AuthOk { error, .. }) => {
                if let Some(error) = error {
                    anyhow::bail!("authentication failed: {error}");
                }
                break;
            }
            Some(_) => continue,
        }
    }

    let mut last_retcode = 0;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        session.cmd(line, dry_run).await?;
        loop {
            match session.next().await {
                None => return Ok(last_retcode),
                Some(ClientEvent::Stdout(bytes)) => {
                    let mut stdout = std::io::stdout();
                    let _ = stdout.write_all(&bytes);
                    let _ = stdout.flush();
                }
                Some(ClientEvent::Stderr(bytes)) => {
                    let mut stderr = std::io::stderr();
                    let _ = stderr.write_all(&bytes);
                    let _ = stderr.flush();
                }
                Some(ClientEvent::CmdDone { retcode, error, .. }) => {
                    if let Some(error) = error {
                        for line in error.lines() {
                            eprintln!("Error: {line}");
                        }
                    }
                    last_retcode = retcode;
                    break;
                }
                Some(_) => continue,
            }
        }
        if session.done {
            break;
        }
    }
    Ok(last_retcode)
}
