//! Record-to-view enrichment over one deduplicated directory lookup.

use courier_bus::{RpcClient, subjects};
use courier_core::chat::{ChatRecord, ChatView, MessageRecord, MessageView};
use courier_core::ids::UserId;
use courier_core::profile::UserProfile;
use courier_core::user::{ProfileBatchReply, ProfileBatchRequest};
use metrics::counter;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// Deadline for the single batched directory lookup. Tighter than the
/// bridge default because enrichment sits on interactive read paths.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Turns id-bearing records into profile-bearing views.
///
/// One call, one batch: the distinct user ids a batch references are
/// collected up front and fetched with a single `user.profiles.get.batch`
/// request, or none at all when the batch references nobody. A failed or
/// partial lookup substitutes [`UserProfile::placeholder`] per missing id;
/// enrichment itself never fails and never reorders its input.
#[derive(Clone)]
pub struct ProfileResolver {
    rpc: RpcClient,
    lookup_timeout: Duration,
}

impl ProfileResolver {
    /// Resolver with the default lookup deadline.
    #[must_use]
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Resolver with an explicit lookup deadline.
    #[must_use]
    pub fn with_lookup_timeout(rpc: RpcClient, lookup_timeout: Duration) -> Self {
        Self {
            rpc,
            lookup_timeout,
        }
    }

    /// Enrich a page of chats: members and last-message senders resolved.
    pub async fn enrich_chats(&self, records: Vec<ChatRecord>) -> Vec<ChatView> {
        let mut wanted = BTreeSet::new();
        for record in &records {
            Self::wanted_by(record, &mut wanted);
        }
        let profiles = self.lookup(wanted).await;

        records
            .into_iter()
            .map(|record| Self::view_of(record, &profiles))
            .collect()
    }

    /// Enrich one chat; same single-lookup path as a page of them.
    pub async fn enrich_chat(&self, record: ChatRecord) -> ChatView {
        let mut wanted = BTreeSet::new();
        Self::wanted_by(&record, &mut wanted);
        let profiles = self.lookup(wanted).await;
        Self::view_of(record, &profiles)
    }

    /// Enrich a page of messages: senders resolved, order untouched.
    pub async fn enrich_messages(&self, records: Vec<MessageRecord>) -> Vec<MessageView> {
        let wanted: BTreeSet<UserId> =
            records.iter().map(|record| record.sender_id.clone()).collect();
        let profiles = self.lookup(wanted).await;

        records
            .into_iter()
            .map(|record| {
                let sender = Self::resolved(&profiles, &record.sender_id);
                record.into_view(sender)
            })
            .collect()
    }

    /// Resolve one user through the same batch path as everything else.
    pub async fn resolve_one(&self, id: &UserId) -> UserProfile {
        let mut wanted = BTreeSet::new();
        let _ = wanted.insert(id.clone());
        let mut profiles = self.lookup(wanted).await;
        profiles
            .remove(id)
            .unwrap_or_else(|| Self::fallback(id))
    }

    /// At most one directory round trip; zero when nothing is wanted.
    async fn lookup(&self, wanted: BTreeSet<UserId>) -> HashMap<UserId, UserProfile> {
        if wanted.is_empty() {
            return HashMap::new();
        }
        let request = ProfileBatchRequest {
            user_ids: wanted.iter().cloned().collect(),
        };
        match self
            .rpc
            .call_with_timeout::<_, ProfileBatchReply>(
                subjects::USER_PROFILES_GET_BATCH,
                &request,
                self.lookup_timeout,
            )
            .await
        {
            Ok(reply) => {
                debug!(
                    requested = wanted.len(),
                    resolved = reply.profiles.len(),
                    "profile batch resolved"
                );
                reply
                    .profiles
                    .into_iter()
                    .map(|profile| (profile.id.clone(), profile))
                    .collect()
            }
            Err(failure) => {
                warn!(
                    requested = wanted.len(),
                    error = %failure,
                    "profile batch lookup failed, serving placeholders"
                );
                counter!("profile_lookup_failures_total").increment(1);
                HashMap::new()
            }
        }
    }

    fn wanted_by(record: &ChatRecord, wanted: &mut BTreeSet<UserId>) {
        wanted.extend(record.member_ids.iter().cloned());
        if let Some(message) = &record.last_message {
            let _ = wanted.insert(message.sender_id.clone());
        }
    }

    fn view_of(record: ChatRecord, profiles: &HashMap<UserId, UserProfile>) -> ChatView {
        ChatView {
            id: record.id,
            name: record.name,
            is_group: record.is_group,
            members: record
                .member_ids
                .iter()
                .map(|id| Self::resolved(profiles, id))
                .collect(),
            last_message: record.last_message.map(|message| {
                let sender = Self::resolved(profiles, &message.sender_id);
                message.into_view(sender)
            }),
        }
    }

    fn resolved(profiles: &HashMap<UserId, UserProfile>, id: &UserId) -> UserProfile {
        profiles
            .get(id)
            .cloned()
            .unwrap_or_else(|| Self::fallback(id))
    }

    fn fallback(id: &UserId) -> UserProfile {
        counter!("profile_fallbacks_total").increment(1);
        UserProfile::placeholder(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_bus::{InMemoryBus, MessageBus, Subject, responder::serve_requests};
    use courier_core::codec::JsonCodec;
    use courier_core::failure::ServiceFailure;
    use courier_core::ids::{ChatId, MessageId};
    use courier_core::profile::FALLBACK_USERNAME;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    fn profile(id: &str, username: &str) -> UserProfile {
        UserProfile::new(UserId::from(id), username)
    }

    fn chat(id: &str, members: &[&str]) -> ChatRecord {
        ChatRecord {
            id: ChatId::from(id),
            name: Some(format!("chat {id}")),
            is_group: true,
            member_ids: members.iter().map(|m| UserId::from(*m)).collect(),
            last_message: None,
        }
    }

    fn message(id: &str, sender: &str) -> MessageRecord {
        MessageRecord {
            message_id: MessageId::from(id),
            chat_id: ChatId::from("c1"),
            sender_id: UserId::from(sender),
            kind: "TEXT".into(),
            content: "hi".into(),
            sent_at: Utc::now(),
        }
    }

    /// Directory stub: answers from `known`, counts calls, captures batches.
    fn spawn_directory(
        bus: &InMemoryBus,
        known: Vec<UserProfile>,
        calls: Arc<AtomicUsize>,
        batches: Arc<Mutex<Vec<Vec<UserId>>>>,
    ) {
        let bus_arc: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let _ = tokio::spawn(serve_requests(
            bus_arc,
            JsonCodec::new(),
            Subject::from(subjects::USER_PROFILES_GET_BATCH),
            CancellationToken::new(),
            move |request: ProfileBatchRequest| {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                batches.lock().push(request.user_ids.clone());
                let known = known.clone();
                async move {
                    let profiles = request
                        .user_ids
                        .iter()
                        .filter_map(|id| known.iter().find(|p| &p.id == id).cloned())
                        .collect();
                    Ok::<_, ServiceFailure>(ProfileBatchReply { profiles })
                }
            },
        ));
    }

    fn resolver(bus: &InMemoryBus) -> ProfileResolver {
        ProfileResolver::new(RpcClient::new(Arc::new(bus.clone()), JsonCodec::new()))
    }

    #[tokio::test]
    async fn five_chats_with_eight_authors_take_one_lookup() {
        let bus = InMemoryBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let known: Vec<UserProfile> = (1..=8).map(|n| profile(&format!("u{n}"), &format!("user{n}"))).collect();
        spawn_directory(&bus, known, Arc::clone(&calls), Arc::new(Mutex::new(Vec::new())));
        tokio::task::yield_now().await;

        let records = vec![
            chat("c1", &["u1", "u2"]),
            chat("c2", &["u2", "u3", "u4"]),
            chat("c3", &["u5", "u6"]),
            chat("c4", &["u1", "u7"]),
            chat("c5", &["u8", "u3"]),
        ];
        let views = resolver(&bus).enrich_chats(records).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(views.len(), 5);
        assert_eq!(views[0].id.as_str(), "c1");
        assert_eq!(views[4].id.as_str(), "c5");
        assert_eq!(views[1].members[2].username, "user4");
    }

    #[tokio::test]
    async fn message_enrichment_preserves_order_and_length() {
        let bus = InMemoryBus::new();
        spawn_directory(
            &bus,
            vec![profile("u1", "ada"), profile("u2", "bo")],
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Mutex::new(Vec::new())),
        );
        tokio::task::yield_now().await;

        let records = vec![message("m3", "u2"), message("m1", "u1"), message("m2", "u2")];
        let views = resolver(&bus).enrich_messages(records).await;

        let order: Vec<&str> = views.iter().map(|v| v.message_id.as_str()).collect();
        assert_eq!(order, ["m3", "m1", "m2"]);
        assert_eq!(views[0].sender.username, "bo");
        assert_eq!(views[1].sender.username, "ada");
    }

    #[tokio::test]
    async fn empty_batch_makes_no_lookup() {
        let bus = InMemoryBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        spawn_directory(&bus, Vec::new(), Arc::clone(&calls), Arc::new(Mutex::new(Vec::new())));
        tokio::task::yield_now().await;

        let resolver = resolver(&bus);
        assert!(resolver.enrich_chats(Vec::new()).await.is_empty());
        assert!(resolver.enrich_messages(Vec::new()).await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_are_looked_up_once() {
        let bus = InMemoryBus::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        spawn_directory(
            &bus,
            vec![profile("u1", "ada"), profile("u2", "bo")],
            Arc::new(AtomicUsize::new(0)),
            Arc::clone(&batches),
        );
        tokio::task::yield_now().await;

        let mut first = chat("c1", &["u1", "u2"]);
        first.last_message = Some(message("m1", "u1"));
        let records = vec![first, chat("c2", &["u2", "u1"])];
        let _ = resolver(&bus).enrich_chats(records).await;

        let sent = batches.lock();
        assert_eq!(sent.len(), 1);
        let ids: Vec<&str> = sent[0].iter().map(UserId::as_str).collect();
        assert_eq!(ids, ["u1", "u2"]);
    }

    #[tokio::test]
    async fn unknown_ids_fall_back_to_the_placeholder() {
        let bus = InMemoryBus::new();
        spawn_directory(
            &bus,
            vec![profile("u1", "ada")],
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Mutex::new(Vec::new())),
        );
        tokio::task::yield_now().await;

        let views = resolver(&bus).enrich_chats(vec![chat("c1", &["u1", "u2"])]).await;

        assert_eq!(views[0].members[0].username, "ada");
        assert_eq!(views[0].members[1].username, FALLBACK_USERNAME);
        assert_eq!(views[0].members[1].id.as_str(), "u2");
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_failure_degrades_every_record_to_placeholders() {
        // No directory responder at all: the batch call times out.
        let bus = InMemoryBus::new();
        let views = resolver(&bus)
            .enrich_chats(vec![chat("c1", &["u1"]), chat("c2", &["u2"])])
            .await;

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].members[0].username, FALLBACK_USERNAME);
        assert_eq!(views[1].members[0].username, FALLBACK_USERNAME);
    }

    #[tokio::test]
    async fn single_resolution_shares_the_batch_path() {
        let bus = InMemoryBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        spawn_directory(
            &bus,
            vec![profile("u7", "grace")],
            Arc::clone(&calls),
            Arc::clone(&batches),
        );
        tokio::task::yield_now().await;

        let found = resolver(&bus).resolve_one(&UserId::from("u7")).await;

        assert_eq!(found.username, "grace");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(batches.lock()[0].len(), 1);
    }
}
