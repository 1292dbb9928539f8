//! End-to-end lifecycle scenarios against the scripted driver.

use std::sync::Arc;
use std::time::Duration;

use mb::client::{ClientConfig, DestroyOptions, InitOutcome, MessagingClient};
use mb::credentials::{CredentialStore, FsCredentialStore, MemoryCredentialStore};
use mb::error::MbError;
use mb_protocol::{ClientState, CredentialBlob, DeliveryStatus, StateChanged};
use mb_runtime::fake::{FakeAuth, FakeBehavior, ScriptedDriver};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> ClientConfig {
	ClientConfig {
		lock_timeout: Duration::from_secs(1),
		handshake_deadline: Duration::from_secs(2),
		..ClientConfig::default()
	}
}

fn client_with_store(behavior: FakeBehavior, store: Arc<dyn CredentialStore>) -> (MessagingClient, mb_runtime::fake::FakeDriverHandle) {
	let (driver, handle) = ScriptedDriver::new(behavior);
	let client = MessagingClient::new(Arc::new(driver), store, fast_config());
	(client, handle)
}

async fn wait_for_state(states: &mut broadcast::Receiver<StateChanged>, target: ClientState) {
	timeout(WAIT, async {
		loop {
			let event = states.recv().await.expect("state channel closed");
			if event.to == target {
				return;
			}
		}
	})
	.await
	.unwrap_or_else(|_| panic!("timed out waiting for {target}"));
}

#[tokio::test]
async fn pairing_flow_connects_after_confirmation() {
	let store = Arc::new(MemoryCredentialStore::new());
	let (client, handle) = client_with_store(FakeBehavior::default(), store.clone());
	let mut states = client.events().subscribe_state();
	let mut pairings = client.events().subscribe_pairing();

	let outcome = client.initialize().await.unwrap();
	assert_eq!(
		outcome,
		InitOutcome::PairingRequired {
			challenge: "000-111".to_string()
		}
	);
	assert_eq!(client.state(), ClientState::PairingPending);

	let challenge = timeout(WAIT, pairings.recv()).await.unwrap().unwrap();
	assert_eq!(challenge.challenge, "000-111");

	handle.confirm_pairing();
	wait_for_state(&mut states, ClientState::Connected).await;

	// The refreshed credential material was persisted by the event pump.
	assert!(store.current().is_some());
}

#[tokio::test]
async fn ready_racing_the_challenge_still_connects() {
	let store = Arc::new(MemoryCredentialStore::new());
	let behavior = FakeBehavior {
		preconfirmed_pairing: true,
		..FakeBehavior::default()
	};
	let (client, _handle) = client_with_store(behavior, store.clone());
	let mut states = client.events().subscribe_state();

	// The confirmation lands back-to-back with the challenge, before the
	// event pump starts; it must be buffered, not dropped.
	let outcome = client.initialize().await.unwrap();
	assert!(matches!(outcome, InitOutcome::PairingRequired { .. }));

	wait_for_state(&mut states, ClientState::Connected).await;
	assert_eq!(client.state(), ClientState::Connected);
	assert!(store.current().is_some());
}

#[tokio::test]
async fn restore_flow_connects_directly() {
	let store = Arc::new(MemoryCredentialStore::with_blob(fresh_blob()));
	let behavior = FakeBehavior {
		auth: FakeAuth::Restored,
		..FakeBehavior::default()
	};
	let (client, handle) = client_with_store(behavior, store);

	let outcome = client.initialize().await.unwrap();
	assert_eq!(outcome, InitOutcome::Connected);
	assert_eq!(client.state(), ClientState::Connected);
	assert_eq!(handle.connect_calls(), 1);
}

#[tokio::test]
async fn stale_stored_credentials_force_pairing_and_are_discarded() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("credentials.json");
	let store = FsCredentialStore::new(&path);
	store.save(&CredentialBlob::new(0, json!({"token": "ancient"}))).unwrap();

	let behavior = FakeBehavior {
		auth: FakeAuth::Restored,
		..FakeBehavior::default()
	};
	let (client, _handle) = client_with_store(behavior, Arc::new(FsCredentialStore::new(&path)));

	let outcome = client.initialize().await.unwrap();
	assert!(matches!(outcome, InitOutcome::PairingRequired { .. }));

	// Rejected blob is gone, with a recovery backup left beside it.
	assert!(!path.exists());
	assert!(dir.path().join("credentials.json.bak").exists());
}

#[tokio::test]
async fn concurrent_initialize_coalesces_onto_one_attempt() {
	let store = Arc::new(MemoryCredentialStore::new());
	let (client, handle) = client_with_store(FakeBehavior::default(), store);
	let client = Arc::new(client);

	let first = tokio::spawn({
		let client = Arc::clone(&client);
		async move { client.initialize().await }
	});
	let second = tokio::spawn({
		let client = Arc::clone(&client);
		async move { client.initialize().await }
	});

	let first = first.await.unwrap().unwrap();
	let second = second.await.unwrap().unwrap();
	assert!(matches!(first, InitOutcome::PairingRequired { .. }));
	assert_eq!(first, second);
	assert_eq!(handle.connect_calls(), 1, "exactly one driver connect");
}

#[tokio::test]
async fn destroy_is_idempotent_and_returns_to_uninitialized() {
	let store = Arc::new(MemoryCredentialStore::new());
	let (client, handle) = client_with_store(FakeBehavior::default(), store);
	let mut states = client.events().subscribe_state();

	client.initialize().await.unwrap();
	handle.confirm_pairing();
	wait_for_state(&mut states, ClientState::Connected).await;

	client.destroy(DestroyOptions::default()).await.unwrap();
	assert_eq!(client.state(), ClientState::Uninitialized);
	assert_eq!(handle.shutdown_calls(), 1);

	// Second destroy is a no-op: no extra teardown of any kind.
	client.destroy(DestroyOptions::default()).await.unwrap();
	assert_eq!(handle.shutdown_calls(), 1);
	assert_eq!(handle.kill_calls(), 0);
}

#[tokio::test]
async fn logout_discards_stored_credentials() {
	let store = Arc::new(MemoryCredentialStore::new());
	let (client, handle) = client_with_store(FakeBehavior::default(), store.clone());
	let mut states = client.events().subscribe_state();

	client.initialize().await.unwrap();
	handle.confirm_pairing();
	wait_for_state(&mut states, ClientState::Connected).await;
	assert!(store.current().is_some());

	client
		.destroy(DestroyOptions {
			preserve_credentials: false,
			reason: "logout".to_string(),
			..DestroyOptions::default()
		})
		.await
		.unwrap();

	assert!(store.current().is_none(), "logout must drop credentials");
	assert_eq!(client.state(), ClientState::Uninitialized);
}

#[tokio::test]
async fn repeated_failures_open_the_breaker() {
	let store = Arc::new(MemoryCredentialStore::new());
	let behavior = FakeBehavior {
		fail_connect: true,
		..FakeBehavior::default()
	};
	let (client, handle) = client_with_store(behavior, store);

	for _ in 0..3 {
		let err = client.initialize().await.unwrap_err();
		assert!(matches!(err, MbError::Driver(_)));
		assert_eq!(client.state(), ClientState::Error);
	}

	// Threshold reached: the next attempt is refused without the driver.
	let err = client.initialize().await.unwrap_err();
	assert!(matches!(err, MbError::BreakerOpen { .. }));
	assert_eq!(handle.connect_calls(), 3);
}

#[tokio::test]
async fn send_and_ack_update_the_delivery_record() {
	let store = Arc::new(MemoryCredentialStore::with_blob(fresh_blob()));
	let behavior = FakeBehavior {
		auth: FakeAuth::Restored,
		..FakeBehavior::default()
	};
	let (client, handle) = client_with_store(behavior, store);
	let mut acks = client.events().subscribe_message_status();

	client.initialize().await.unwrap();
	let id = client.send_message("2025-06-01", "contact-1", "hello").await.unwrap();
	assert_eq!(handle.sent_messages().len(), 1);

	let stats = client.session_stats();
	assert_eq!(stats.active_count, 1);
	assert_eq!(stats.pending_by_window.get("2025-06-01"), Some(&1));

	handle.ack(&id, DeliveryStatus::Delivered);
	let update = timeout(WAIT, async {
		loop {
			let event = acks.recv().await.expect("ack channel closed");
			if event.message_id == id && event.status == DeliveryStatus::Delivered {
				return event;
			}
		}
	})
	.await
	.expect("delivery ack never surfaced");
	assert_eq!(update.status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn disconnect_then_reinitialize_builds_a_fresh_session() {
	let store = Arc::new(MemoryCredentialStore::with_blob(fresh_blob()));
	let behavior = FakeBehavior {
		auth: FakeAuth::Restored,
		..FakeBehavior::default()
	};
	let (client, handle) = client_with_store(behavior, store);
	let mut states = client.events().subscribe_state();

	client.initialize().await.unwrap();
	wait_for_state(&mut states, ClientState::Connected).await;

	handle.disconnect("network dropped");
	wait_for_state(&mut states, ClientState::Disconnected).await;
	assert!(matches!(
		client.send_message("w", "r", "p").await.unwrap_err(),
		MbError::NotConnected(ClientState::Disconnected)
	));

	let outcome = client.initialize().await.unwrap();
	assert_eq!(outcome, InitOutcome::Connected);
	assert_eq!(handle.connect_calls(), 2);
}

fn fresh_blob() -> CredentialBlob {
	let now_ms = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0);
	CredentialBlob::new(now_ms, json!({"token": "fresh"}))
}
