//! The event broadcast hub.
//!
//! Holds the set of live dashboard subscribers and fans every published
//! [`ServerEvent`] out to all of them. Each subscriber owns an unbounded
//! frame queue drained by its socket writer; a queue whose receiver is gone
//! means the socket is dead, and the subscriber is evicted on the spot.
//!
//! The subscriber set sits behind a single mutex held for the whole fan-out,
//! so concurrent connect, disconnect, and publish calls never observe a torn
//! iteration, and every subscriber sees events in emission order.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, Weak},
  time::Duration,
};

use chrono::{Local, NaiveDate, Utc};
use portaria_core::{
  event::{ClientFrame, ClientMessage, Envelope, HeartbeatPayload, PongPayload, ServerEvent},
  record::{AccessRecord, DailyStatistics},
  store::RecordStore,
};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use uuid::Uuid;

use crate::auth::{AuthFailure, Authenticator, Identity};

/// Number of recent records replayed to a new subscriber.
pub const DEFAULT_BOOTSTRAP_RECENT: usize = 5;

/// Interval between heartbeat events.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ─── Subscription types ───────────────────────────────────────────────────────

/// Identifies one registered subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
  pub id:       Uuid,
  pub identity: Identity,
}

/// Serialised frames for one subscriber, in delivery order.
pub type FrameReceiver = mpsc::UnboundedReceiver<String>;

/// The result of a successful [`Hub::connect`].
pub struct Subscription {
  pub handle: SubscriberHandle,
  pub frames: FrameReceiver,
}

struct Subscriber {
  identity: Identity,
  tx:       mpsc::UnboundedSender<String>,
}

// ─── Hub ──────────────────────────────────────────────────────────────────────

pub struct Hub<S> {
  store:            Arc<S>,
  auth:             Authenticator,
  bootstrap_recent: usize,
  subscribers:      Mutex<HashMap<Uuid, Subscriber>>,
}

impl<S: RecordStore> Hub<S> {
  pub fn new(store: Arc<S>, auth: Authenticator, bootstrap_recent: usize) -> Self {
    Self {
      store,
      auth,
      bootstrap_recent,
      subscribers: Mutex::new(HashMap::new()),
    }
  }

  /// Validate `credential`, register a new subscriber, and queue its
  /// bootstrap: one statistics snapshot, then up to `bootstrap_recent` of
  /// today's records, newest first. The bootstrap is queued under the same
  /// lock that registers the subscriber, so it always precedes any event
  /// published afterwards.
  pub async fn connect(&self, credential: Option<&str>) -> Result<Subscription, AuthFailure> {
    let identity = self.auth.authenticate(credential)?;

    let today = today();
    let statistics = self.statistics_for(today).await;
    let recent = match self.store.recent_records(today, self.bootstrap_recent).await {
      Ok(records) => records,
      Err(e) => {
        tracing::error!(error = %e, "failed to load recent records for bootstrap");
        Vec::new()
      }
    };

    let mut bootstrap = Vec::with_capacity(recent.len() + 1);
    bootstrap.push(ServerEvent::Statistics(statistics));
    bootstrap.extend(recent.into_iter().map(ServerEvent::from_record));

    let (tx, frames) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    {
      let mut subscribers = self.lock();
      for event in bootstrap {
        match Envelope::now(event).to_frame() {
          // The receiver is still in our hands, so this cannot fail.
          Ok(frame) => drop(tx.send(frame)),
          Err(e) => tracing::error!(error = %e, "failed to serialise bootstrap event"),
        }
      }
      subscribers.insert(id, Subscriber { identity: identity.clone(), tx });
    }

    tracing::info!(
      subscriber = %id,
      user = %identity.user_id,
      role = %identity.role,
      "subscriber connected"
    );

    Ok(Subscription {
      handle: SubscriberHandle { id, identity },
      frames,
    })
  }

  /// Deliver `event` to every registered subscriber. Subscribers whose queue
  /// is closed are evicted; delivery to the rest continues. Returns the
  /// number of subscribers the event was delivered to.
  pub fn publish(&self, event: ServerEvent) -> usize {
    let kind = event.kind();
    let frame = match Envelope::now(event).to_frame() {
      Ok(frame) => frame,
      Err(e) => {
        tracing::error!(error = %e, kind, "failed to serialise event, dropping");
        return 0;
      }
    };

    let mut subscribers = self.lock();
    subscribers.retain(|id, subscriber| {
      let delivered = subscriber.tx.send(frame.clone()).is_ok();
      if !delivered {
        tracing::warn!(
          subscriber = %id,
          user = %subscriber.identity.user_id,
          "delivery failed, evicting subscriber"
        );
      }
      delivered
    });

    tracing::debug!(kind, delivered = subscribers.len(), "event published");
    subscribers.len()
  }

  /// Publish the entrance/exit event for a freshly persisted `record`,
  /// followed by a recomputed statistics snapshot.
  pub async fn publish_entry_event(&self, record: AccessRecord) {
    self.publish(ServerEvent::from_record(record));
    let statistics = self.statistics_for(today()).await;
    self.publish(ServerEvent::Statistics(statistics));
  }

  /// Publish one heartbeat carrying the current subscriber count.
  pub fn heartbeat(&self) -> usize {
    let event = ServerEvent::Heartbeat(HeartbeatPayload {
      as_of:                   Utc::now(),
      active_subscriber_count: self.subscriber_count(),
    });
    self.publish(event)
  }

  /// Remove a subscriber. Unknown ids are ignored.
  pub fn disconnect(&self, id: Uuid) {
    if let Some(subscriber) = self.lock().remove(&id) {
      tracing::info!(
        subscriber = %id,
        user = %subscriber.identity.user_id,
        "subscriber disconnected"
      );
    }
  }

  /// Deliver `event` to a single subscriber, evicting it on failure.
  pub fn send_to(&self, id: Uuid, event: ServerEvent) -> bool {
    let frame = match Envelope::now(event).to_frame() {
      Ok(frame) => frame,
      Err(e) => {
        tracing::error!(error = %e, subscriber = %id, "failed to serialise event");
        return false;
      }
    };

    let mut subscribers = self.lock();
    let Some(subscriber) = subscribers.get(&id) else { return false };
    if subscriber.tx.send(frame).is_ok() {
      return true;
    }
    subscribers.remove(&id);
    tracing::warn!(subscriber = %id, "delivery failed, evicting subscriber");
    false
  }

  /// Act on one text frame received from a subscriber. Malformed frames and
  /// unknown kinds are logged and otherwise ignored.
  pub fn handle_client_message(&self, id: Uuid, text: &str) {
    let frame = match ClientFrame::parse(text) {
      Ok(frame) => frame,
      Err(e) => {
        tracing::warn!(subscriber = %id, error = %e, "malformed client message ignored");
        return;
      }
    };

    match frame.message() {
      ClientMessage::Ping => {
        self.send_to(id, ServerEvent::Pong(PongPayload { as_of: Utc::now() }));
      }
      ClientMessage::Unrecognized(kind) => {
        tracing::debug!(subscriber = %id, kind, "unrecognised client message");
      }
    }
  }

  pub fn subscriber_count(&self) -> usize { self.lock().len() }

  /// Counts for `date`, zeroed when the store cannot compute them.
  async fn statistics_for(&self, date: NaiveDate) -> DailyStatistics {
    match self.store.daily_statistics(date).await {
      Ok(statistics) => statistics,
      Err(e) => {
        tracing::error!(error = %e, %date, "failed to compute daily statistics");
        DailyStatistics::empty(Utc::now())
      }
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Subscriber>> {
    // A panic while holding the lock cannot leave the map half-updated.
    self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl<S: RecordStore + 'static> Hub<S> {
  /// Spawn the periodic heartbeat. The task ends once the hub is dropped.
  pub fn spawn_heartbeat(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
    let hub: Weak<Self> = Arc::downgrade(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(hub) = hub.upgrade() else { break };
        let delivered = hub.heartbeat();
        tracing::debug!(delivered, "heartbeat");
      }
    })
  }
}

/// The current local calendar day.
pub fn today() -> NaiveDate { Local::now().date_naive() }

// ─── Tests ────────────────────────────────────────────────────────────────────
