// Manual probe: logs in against the configured backend and prints every
// published snapshot until the session is ready (or the timeout hits).

use std::time::{Duration, Instant};

use roost_core::{App, AppAction, AppReconciler, AppUpdate, AuthState};

struct Printer;

impl AppReconciler for Printer {
    fn reconcile(&self, update: AppUpdate) {
        match update {
            AppUpdate::FullState(state) => {
                println!(
                    "rev={} auth={:?} session={:?} rooms={} busy={:?} toast={:?}",
                    state.rev,
                    state.auth,
                    state.session,
                    state.rooms.len(),
                    state.busy,
                    state.toast
                );
            }
            AppUpdate::SessionReady { rev, user_id } => {
                println!("rev={rev} session ready for {user_id}");
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let data_dir = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: session_probe <data_dir> [<email> <password>]"))?;
    let email = args.next();
    let password = args.next();

    let app = App::new(data_dir);
    app.listen_for_updates(Box::new(Printer));

    match (email, password) {
        (Some(email), Some(password)) => {
            app.dispatch(AppAction::Login { email, password });
        }
        _ => {
            println!("no credentials given, restoring from cache");
            app.dispatch(AppAction::RestoreFromCache);
        }
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        let state = app.state();
        if state.is_ready() {
            println!("ready; rooms:");
            for room in &state.rooms {
                println!("  {} ({}, unread {})", room.name, room.id, room.unread);
            }
            return Ok(());
        }
        if let AuthState::LoggedOut = state.auth {
            if let Some(toast) = state.toast {
                anyhow::bail!("session failed: {toast}");
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    anyhow::bail!("timed out waiting for a ready session")
}
