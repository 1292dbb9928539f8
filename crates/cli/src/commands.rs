use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use mb::client::{ClientConfig, DestroyOptions, InitOutcome, MessagingClient};
use mb::credentials::{CredentialStore, FsCredentialStore, LoadedCredentials, MemoryCredentialStore};
use mb_protocol::{ClientEvent, ClientState, CredentialBlob};
use mb_runtime::fake::{FakeAuth, FakeBehavior, ScriptedDriver};
use serde_json::json;
use tokio::time::{timeout, timeout_at};

use crate::cli::{Cli, Commands, CredentialsAction};

const CONNECT_WAIT: Duration = Duration::from_secs(30);

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	match cli.command {
		Commands::Demo {
			restored,
			message,
			recipient,
		} => demo(cli.credentials.as_deref(), restored, &message, &recipient).await,
		Commands::Credentials { action } => {
			let Some(path) = cli.credentials.as_deref() else {
				bail!("--credentials <FILE> is required for this command");
			};
			credentials(path, action)
		}
	}
}

async fn demo(credential_path: Option<&Path>, restored: bool, messages: &[String], recipient: &str) -> anyhow::Result<()> {
	let store: Arc<dyn CredentialStore> = match credential_path {
		Some(path) => Arc::new(FsCredentialStore::new(path)),
		None if restored => Arc::new(MemoryCredentialStore::with_blob(demo_blob())),
		None => Arc::new(MemoryCredentialStore::new()),
	};

	let behavior = FakeBehavior {
		auth: if restored {
			FakeAuth::Restored
		} else {
			FakeAuth::Pairing {
				challenge: "114-514".to_string(),
			}
		},
		auto_ack: true,
		..FakeBehavior::default()
	};
	let (driver, handle) = ScriptedDriver::new(behavior);
	let client = MessagingClient::new(Arc::new(driver), store, ClientConfig::default());

	// One merged stream carries every concern the sink would relay.
	let mut events = client.events().subscribe_all();

	match client.initialize().await? {
		InitOutcome::Connected => println!("session restored from stored credentials"),
		InitOutcome::PairingRequired { challenge } => {
			println!("pairing required, enter code on the device: {challenge}");
			// The scripted counterpart confirms on our behalf.
			tokio::time::sleep(Duration::from_millis(300)).await;
			handle.confirm_pairing();

			timeout(CONNECT_WAIT, async {
				loop {
					let event = events.recv().await.context("event stream ended")?;
					if let ClientEvent::StateChanged(change) = event {
						println!("state: {} -> {} ({})", change.from, change.to, change.reason);
						if change.to == ClientState::Connected {
							return anyhow::Ok(());
						}
					}
				}
			})
			.await
			.context("timed out waiting for connection")??;
		}
	}

	for (index, payload) in messages.iter().enumerate() {
		let window_key = format!("demo-window-{index}");
		let id = client.send_message(&window_key, recipient, payload).await?;
		println!("queued {id} -> {recipient}: {payload}");
	}

	// Give the auto-acknowledgements a moment to land.
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	loop {
		match timeout_at(deadline, events.recv()).await {
			Ok(Ok(ClientEvent::MessageStatus(update))) => {
				println!("ack: {} is now {}", update.message_id, update.status);
			}
			Ok(Ok(_)) => {}
			_ => break,
		}
	}

	let stats = client.session_stats();
	println!("sessions: {} active, {} completed", stats.active_count, stats.history_count);

	client.destroy(DestroyOptions::default()).await?;
	println!("client destroyed");
	Ok(())
}

fn credentials(path: &Path, action: CredentialsAction) -> anyhow::Result<()> {
	let store = FsCredentialStore::new(path);
	match action {
		CredentialsAction::Show => match store.load()? {
			LoadedCredentials::Absent => println!("no credentials stored at {}", path.display()),
			LoadedCredentials::Unreadable => println!("stored blob at {} is unreadable", path.display()),
			LoadedCredentials::Present(blob) => {
				let age_ms = now_ms().saturating_sub(blob.saved_at_ms);
				println!("schema v{}, saved {}s ago", blob.schema, age_ms / 1000);
			}
		},
		CredentialsAction::Clear => {
			if store.discard()? {
				println!("credentials discarded (backup kept)");
			} else {
				println!("nothing to discard");
			}
		}
	}
	Ok(())
}

fn demo_blob() -> CredentialBlob {
	CredentialBlob::new(now_ms(), json!({ "token": "demo-session" }))
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn credentials_show_then_clear_removes_the_blob() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("credentials.json");
		FsCredentialStore::new(&path).save(&demo_blob()).unwrap();

		credentials(&path, CredentialsAction::Show).unwrap();
		credentials(&path, CredentialsAction::Clear).unwrap();

		assert!(!path.exists());
		assert!(dir.path().join("credentials.json.bak").exists());
	}

	#[test]
	fn clear_without_a_stored_blob_is_a_noop() {
		let dir = tempfile::tempdir().unwrap();
		credentials(&dir.path().join("missing.json"), CredentialsAction::Clear).unwrap();
	}

	#[tokio::test]
	async fn demo_pairing_flow_runs_to_completion() {
		demo(None, false, &["hello".to_string()], "demo-recipient").await.unwrap();
	}
}
