/**
 * SUBSCRIBER SELECTION ENGINE
 *
 * ROLE:
 * Per-channel subscription forms (email, webhook, Discord, Slack): a contact,
 * a notify-all flag and an explicit set of component ids picked on the tree.
 *
 * HOW IT WORKS:
 * - One `ChannelSubscription` type, four independent instances in `SubscriberForms`
 * - Checking a group picks its whole subtree, unchecking drops it
 * - notify-all sends `["ALL"]` and leaves the explicit set untouched underneath
 * - `begin_submit` validates, builds the request and locks the form until
 *   `complete`, which resets it on success and keeps it on failure for a retry
 * - Forms live in `SubscriptionSessions`, one set per visitor token, dropped
 *   after a period of inactivity
 */

use crate::status::tree::ComponentTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ALL_COMPONENTS: &str = "ALL";

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("unknown component: {0}")]
    UnknownComponent(String),
    #[error("selection is locked while notify-all is on")]
    SelectionLocked,
    #[error("a submission for this form is already in progress")]
    SubmissionPending,
    #[error("unknown or expired subscription session")]
    UnknownSession,
    #[error("contact is required")]
    EmptyContact,
    #[error("not a valid email address: {0}")]
    InvalidEmail(String),
    #[error("not a valid http(s) URL: {0}")]
    InvalidUrl(String),
    #[error("select at least one component or enable notify-all")]
    EmptySelection,
    #[error("subscription endpoint not configured")]
    NotConfigured,
    #[error("subscription request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("subscription rejected: {0}")]
    Rejected(String),
}

impl SubscriptionError {
    /// Caller mistakes, as opposed to upstream trouble.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::NotConfigured | Self::Transport(_) | Self::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Webhook,
    Discord,
    Slack,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Webhook, Channel::Discord, Channel::Slack];

    pub fn key(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Webhook => "webhook",
            Channel::Discord => "discord",
            Channel::Slack => "slack",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Channel {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| SubscriptionError::UnknownChannel(s.to_string()))
    }
}

/// Body POSTed to the subscription endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    pub contact: BTreeMap<&'static str, String>,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSubscription {
    pub channel: Channel,
    pub contact: String,
    pub notify_all: bool,
    pub selected: BTreeSet<String>,
    /// Set between `begin_submit` and `complete`; edits are refused meanwhile.
    pub submitting: bool,
}

impl ChannelSubscription {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            contact: String::new(),
            notify_all: false,
            selected: BTreeSet::new(),
            submitting: false,
        }
    }

    fn ensure_editable(&self) -> Result<(), SubscriptionError> {
        if self.submitting {
            return Err(SubscriptionError::SubmissionPending);
        }
        Ok(())
    }

    /// Checks or unchecks `id`. For a group the whole subtree follows.
    pub fn toggle(&mut self, tree: &ComponentTree, id: &str, checked: bool) -> Result<(), SubscriptionError> {
        let node = tree
            .lookup(id)
            .ok_or_else(|| SubscriptionError::UnknownComponent(id.to_string()))?;
        self.ensure_editable()?;
        if self.notify_all {
            return Err(SubscriptionError::SelectionLocked);
        }
        for member in tree.subtree(node) {
            let member_id = &tree.node(member).id;
            if checked {
                self.selected.insert(member_id.clone());
            } else {
                self.selected.remove(member_id);
            }
        }
        Ok(())
    }

    pub fn set_notify_all(&mut self, enabled: bool) -> Result<(), SubscriptionError> {
        self.ensure_editable()?;
        self.notify_all = enabled;
        Ok(())
    }

    pub fn set_contact(&mut self, value: &str) -> Result<(), SubscriptionError> {
        self.ensure_editable()?;
        self.contact = value.trim().to_string();
        Ok(())
    }

    /// Drops selected ids that are no longer in `tree`.
    pub fn reconcile(&mut self, tree: &ComponentTree) {
        let before = self.selected.len();
        self.selected.retain(|id| tree.contains_id(id));
        if self.selected.len() != before {
            debug!("{} form: dropped {} vanished component(s)", self.channel, before - self.selected.len());
        }
    }

    pub fn validate(&self) -> Result<(), SubscriptionError> {
        let contact = self.contact.trim();
        if contact.is_empty() {
            return Err(SubscriptionError::EmptyContact);
        }
        match self.channel {
            Channel::Email => {
                if !contact.contains('@') {
                    return Err(SubscriptionError::InvalidEmail(contact.to_string()));
                }
            }
            Channel::Webhook | Channel::Discord | Channel::Slack => {
                let url = reqwest::Url::parse(contact)
                    .map_err(|_| SubscriptionError::InvalidUrl(contact.to_string()))?;
                if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
                    return Err(SubscriptionError::InvalidUrl(contact.to_string()));
                }
            }
        }
        if !self.notify_all && self.selected.is_empty() {
            return Err(SubscriptionError::EmptySelection);
        }
        Ok(())
    }

    pub fn prepare(&self) -> Result<SubscriptionRequest, SubscriptionError> {
        self.validate()?;
        let components = if self.notify_all {
            vec![ALL_COMPONENTS.to_string()]
        } else {
            self.selected.iter().cloned().collect()
        };
        Ok(SubscriptionRequest {
            contact: BTreeMap::from([(self.channel.key(), self.contact.trim().to_string())]),
            components,
        })
    }

    /// Validates, builds the request and locks the form until `complete`.
    pub fn begin_submit(&mut self) -> Result<SubscriptionRequest, SubscriptionError> {
        self.ensure_editable()?;
        let request = self.prepare()?;
        self.submitting = true;
        Ok(request)
    }

    /// Applies the submission outcome: reset on success, unlocked but
    /// otherwise untouched on failure.
    pub fn complete<T>(&mut self, result: &Result<T, SubscriptionError>) {
        self.submitting = false;
        match result {
            Ok(_) => self.reset(),
            Err(e) => warn!("{} subscription failed, keeping form: {}", self.channel, e),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.channel);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriberForms {
    pub email: ChannelSubscription,
    pub webhook: ChannelSubscription,
    pub discord: ChannelSubscription,
    pub slack: ChannelSubscription,
}

impl Default for SubscriberForms {
    fn default() -> Self {
        Self {
            email: ChannelSubscription::new(Channel::Email),
            webhook: ChannelSubscription::new(Channel::Webhook),
            discord: ChannelSubscription::new(Channel::Discord),
            slack: ChannelSubscription::new(Channel::Slack),
        }
    }
}

impl SubscriberForms {
    pub fn channel(&self, channel: Channel) -> &ChannelSubscription {
        match channel {
            Channel::Email => &self.email,
            Channel::Webhook => &self.webhook,
            Channel::Discord => &self.discord,
            Channel::Slack => &self.slack,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut ChannelSubscription {
        match channel {
            Channel::Email => &mut self.email,
            Channel::Webhook => &mut self.webhook,
            Channel::Discord => &mut self.discord,
            Channel::Slack => &mut self.slack,
        }
    }

    pub fn reconcile(&mut self, tree: &ComponentTree) {
        for channel in Channel::ALL {
            self.channel_mut(channel).reconcile(tree);
        }
    }
}

struct Session {
    forms: SubscriberForms,
    last_seen: Instant,
    /// Value of the use counter at last access, for least-recently-used eviction.
    last_use: u64,
}

/// Subscription forms per visitor, keyed by an opaque random token.
/// Sessions idle for `ttl` are dropped; past `capacity` the least recently
/// used one makes room.
pub struct SubscriptionSessions {
    sessions: HashMap<String, Session>,
    ttl: Duration,
    capacity: usize,
    uses: u64,
}

impl SubscriptionSessions {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
            uses: 0,
        }
    }

    pub fn open(&mut self) -> (String, SubscriberForms) {
        self.evict_expired();
        if self.sessions.len() >= self.capacity {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.last_use)
                .map(|(token, _)| token.clone());
            if let Some(token) = oldest {
                self.sessions.remove(&token);
            }
        }

        let token = Uuid::new_v4().to_string();
        let forms = SubscriberForms::default();
        self.uses += 1;
        self.sessions.insert(
            token.clone(),
            Session {
                forms: forms.clone(),
                last_seen: Instant::now(),
                last_use: self.uses,
            },
        );
        (token, forms)
    }

    /// The visitor's forms, refreshing their idle timer.
    pub fn forms_mut(&mut self, token: &str) -> Result<&mut SubscriberForms, SubscriptionError> {
        let ttl = self.ttl;
        if self.sessions.get(token).is_some_and(|s| s.last_seen.elapsed() >= ttl) {
            self.sessions.remove(token);
        }
        let session = self.sessions.get_mut(token).ok_or(SubscriptionError::UnknownSession)?;
        self.uses += 1;
        session.last_seen = Instant::now();
        session.last_use = self.uses;
        Ok(&mut session.forms)
    }

    pub fn close(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.sessions.retain(|_, s| s.last_seen.elapsed() < ttl);
    }
}

/// Where prepared subscriptions are delivered.
pub trait SubscriptionSink {
    fn submit(&self, request: &SubscriptionRequest) -> impl Future<Output = Result<(), SubscriptionError>> + Send;
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    #[serde(default)]
    success: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct HttpSubscriptionSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSubscriptionSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SubscriptionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

impl SubscriptionSink for HttpSubscriptionSink {
    async fn submit(&self, request: &SubscriptionRequest) -> Result<(), SubscriptionError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        let reply = response.json::<SubmitReply>().await.ok();

        match reply {
            Some(SubmitReply { success: true, .. }) if status.is_success() => {
                info!("subscription accepted for {} component(s)", request.components.len());
                Ok(())
            }
            Some(SubmitReply { error: Some(msg), .. }) => Err(SubscriptionError::Rejected(msg)),
            _ => Err(SubscriptionError::Rejected(format!("HTTP {}", status.as_u16()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GroupCatalog;
    use crate::models::{ComponentRecord, Status};
    use crate::status::normalize::normalize;
    use hostpulse_devkit::MockUpstream;

    fn record(id: &str, group: Option<&str>) -> ComponentRecord {
        ComponentRecord {
            id: id.into(),
            name: id.into(),
            status: Status::Operational,
            group_id: group.map(str::to_string),
            is_collapsed: None,
        }
    }

    // A > {B, G2 > {C, D}}, plus loose leaf E.
    fn tree() -> ComponentTree {
        let mut catalog = GroupCatalog::default();
        catalog.children.insert("A".into(), vec!["G2".into()]);
        normalize(
            &[record("B", Some("A")), record("C", Some("G2")), record("D", Some("G2")), record("E", None)],
            &catalog,
        )
    }

    fn ids(sub: &ChannelSubscription) -> Vec<&str> {
        sub.selected.iter().map(String::as_str).collect()
    }

    #[test]
    fn group_selection_reaches_every_depth() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.toggle(&tree, "A", true).unwrap();
        assert_eq!(ids(&sub), vec!["A", "B", "C", "D", "G2"]);
        assert!(!sub.selected.contains("E"));
    }

    #[test]
    fn select_then_deselect_restores_prior_set() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.toggle(&tree, "E", true).unwrap();
        let before = sub.selected.clone();

        sub.toggle(&tree, "G2", true).unwrap();
        sub.toggle(&tree, "G2", false).unwrap();
        assert_eq!(sub.selected, before);
    }

    #[test]
    fn leaf_toggle_touches_only_itself() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Slack);
        sub.toggle(&tree, "A", true).unwrap();
        sub.toggle(&tree, "C", false).unwrap();
        assert_eq!(ids(&sub), vec!["A", "B", "D", "G2"]);
    }

    #[test]
    fn channels_are_independent() {
        let tree = tree();
        let mut forms = SubscriberForms::default();
        forms.channel_mut(Channel::Email).toggle(&tree, "A", true).unwrap();
        forms.channel_mut(Channel::Discord).set_notify_all(true).unwrap();

        assert!(forms.webhook.selected.is_empty());
        assert!(!forms.webhook.notify_all);
        assert!(!forms.email.notify_all);
        assert!(forms.discord.selected.is_empty());
    }

    #[test]
    fn notify_all_sends_sentinel_and_keeps_explicit_set() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_contact("ops@example.net").unwrap();
        sub.toggle(&tree, "B", true).unwrap();
        sub.set_notify_all(true).unwrap();

        let request = sub.prepare().unwrap();
        assert_eq!(request.components, vec![ALL_COMPONENTS]);
        assert_eq!(request.contact["email"], "ops@example.net");
        assert!(matches!(sub.toggle(&tree, "C", true), Err(SubscriptionError::SelectionLocked)));

        sub.set_notify_all(false).unwrap();
        assert_eq!(ids(&sub), vec!["B"]);
    }

    #[test]
    fn contact_validation_per_channel() {
        let mut email = ChannelSubscription::new(Channel::Email);
        email.set_notify_all(true).unwrap();
        assert!(matches!(email.validate(), Err(SubscriptionError::EmptyContact)));
        email.set_contact("not-an-address").unwrap();
        assert!(matches!(email.validate(), Err(SubscriptionError::InvalidEmail(_))));
        email.set_contact("a@b.c").unwrap();
        assert!(email.validate().is_ok());

        let mut hook = ChannelSubscription::new(Channel::Webhook);
        hook.set_notify_all(true).unwrap();
        for bad in ["hooks.example.net/x", "ftp://example.net/x", "/relative"] {
            hook.set_contact(bad).unwrap();
            assert!(matches!(hook.validate(), Err(SubscriptionError::InvalidUrl(_))), "{bad}");
        }
        hook.set_contact("https://hooks.example.net/x").unwrap();
        assert!(hook.validate().is_ok());
    }

    #[test]
    fn empty_explicit_selection_is_rejected() {
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_contact("a@b.c").unwrap();
        assert!(matches!(sub.prepare(), Err(SubscriptionError::EmptySelection)));
    }

    #[test]
    fn unknown_component_and_channel() {
        let mut sub = ChannelSubscription::new(Channel::Email);
        assert!(matches!(sub.toggle(&tree(), "zz", true), Err(SubscriptionError::UnknownComponent(_))));
        assert_eq!("Discord".parse::<Channel>().unwrap(), Channel::Discord);
        assert!("pager".parse::<Channel>().is_err());
    }

    #[test]
    fn completion_resets_only_on_success() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Webhook);
        sub.set_contact("https://hooks.example.net/x").unwrap();
        sub.toggle(&tree, "E", true).unwrap();

        sub.begin_submit().unwrap();
        sub.complete::<()>(&Err(SubscriptionError::Rejected("busy".into())));
        assert_eq!(ids(&sub), vec!["E"]);
        assert!(!sub.submitting);

        sub.begin_submit().unwrap();
        sub.complete(&Ok(()));
        assert_eq!(sub, ChannelSubscription::new(Channel::Webhook));
    }

    #[test]
    fn form_is_locked_while_submitting() {
        let tree = tree();
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_contact("ops@example.net").unwrap();
        sub.toggle(&tree, "B", true).unwrap();
        sub.begin_submit().unwrap();

        assert!(matches!(sub.begin_submit(), Err(SubscriptionError::SubmissionPending)));
        assert!(matches!(sub.toggle(&tree, "C", true), Err(SubscriptionError::SubmissionPending)));
        assert!(matches!(sub.set_contact("x@y.z"), Err(SubscriptionError::SubmissionPending)));

        sub.complete(&Ok(()));
        assert!(sub.selected.is_empty());
        assert!(sub.set_contact("x@y.z").is_ok());
    }

    #[test]
    fn validation_failure_does_not_lock() {
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_notify_all(true).unwrap();
        assert!(matches!(sub.begin_submit(), Err(SubscriptionError::EmptyContact)));
        assert!(!sub.submitting);
    }

    #[test]
    fn vanished_components_are_pruned() {
        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.toggle(&tree(), "G2", true).unwrap();
        sub.toggle(&tree(), "E", true).unwrap();

        let smaller = normalize(&[record("C", Some("G2")), record("E", None)], &GroupCatalog::default());
        let mut forms = SubscriberForms::default();
        forms.email = sub;
        forms.reconcile(&smaller);
        assert_eq!(ids(&forms.email), vec!["C", "E", "G2"]);
    }

    #[test]
    fn sessions_are_isolated() {
        let tree = tree();
        let mut sessions = SubscriptionSessions::new(Duration::from_secs(60), 10);
        let (alice, _) = sessions.open();
        let (bob, forms) = sessions.open();
        assert_ne!(alice, bob);
        assert!(forms.email.contact.is_empty());

        let email = sessions.forms_mut(&alice).unwrap().channel_mut(Channel::Email);
        email.set_contact("alice@private.example").unwrap();
        email.toggle(&tree, "B", true).unwrap();

        let bob_email = &sessions.forms_mut(&bob).unwrap().email;
        assert!(bob_email.contact.is_empty());
        assert!(bob_email.selected.is_empty());
        assert!(matches!(sessions.forms_mut("nope"), Err(SubscriptionError::UnknownSession)));

        assert!(sessions.close(&alice));
        assert!(sessions.forms_mut(&alice).is_err());
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn idle_sessions_expire_and_capacity_evicts_oldest() {
        let mut expiring = SubscriptionSessions::new(Duration::ZERO, 10);
        let (token, _) = expiring.open();
        assert!(matches!(expiring.forms_mut(&token), Err(SubscriptionError::UnknownSession)));
        assert!(expiring.is_empty());

        let mut full = SubscriptionSessions::new(Duration::from_secs(60), 2);
        let (first, _) = full.open();
        let (second, _) = full.open();
        let (third, _) = full.open();
        assert_eq!(full.len(), 2);
        assert!(full.forms_mut(&first).is_err());
        assert!(full.forms_mut(&second).is_ok());
        assert!(full.forms_mut(&third).is_ok());
    }

    #[tokio::test]
    async fn http_sink_posts_payload() {
        let upstream = MockUpstream::start().await;
        let sink = HttpSubscriptionSink::new(upstream.url("/subscribe"), Duration::from_secs(5)).unwrap();

        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_contact("ops@example.net").unwrap();
        sub.set_notify_all(true).unwrap();
        let request = sub.prepare().unwrap();
        sink.submit(&request).await.unwrap();

        let received = upstream.subscriptions();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["contact"]["email"], "ops@example.net");
        assert_eq!(received[0]["components"][0], "ALL");
    }

    #[tokio::test]
    async fn http_sink_surfaces_rejection() {
        let upstream = MockUpstream::start().await;
        upstream.reject_subscriptions("address on blocklist");
        let sink = HttpSubscriptionSink::new(upstream.url("/subscribe"), Duration::from_secs(5)).unwrap();

        let mut sub = ChannelSubscription::new(Channel::Email);
        sub.set_contact("ops@example.net").unwrap();
        sub.set_notify_all(true).unwrap();
        let err = sink.submit(&sub.prepare().unwrap()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Rejected(msg) if msg == "address on blocklist"));
    }
}
