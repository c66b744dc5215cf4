//! Scenario world wrapping a broker over a temporary storage root.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

use stowage_config::Config;

use crate::broker::Broker;
use crate::dispatch::{Request, route};
use crate::envelope::Envelope;
use crate::identity::{ConversationId, UserId};
use crate::version::Repository;
use crate::zones::locks::LockRecord;
use crate::zones::{EntryPath, UserRoot, Zone, ZoneLayout};

/// User owning every root in the broker scenarios.
pub const USER: &str = "alice";

/// State for broker scenarios: the broker, its storage root and every reply.
pub struct BrokerWorld {
    temp_dir: TempDir,
    broker: Broker,
    replies: Vec<Envelope>,
    pub skipped: bool,
}

impl BrokerWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to allocate temporary directory");
        let broker = Broker::new(temp_dir.path().join("storage"), Config::default().limits());
        Self {
            temp_dir,
            broker,
            replies: Vec::new(),
            skipped: false,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn limit_writes(&mut self, bytes: u64) {
        let limits = self.broker.limits().with_max_write_bytes(bytes);
        self.broker = Broker::new(self.storage_root(), limits);
    }

    pub fn storage_root(&self) -> PathBuf {
        self.temp_dir.path().join("storage")
    }

    /// Routes `request` on behalf of `conversation`, recording the reply.
    /// Does nothing once the scenario has been skipped.
    pub fn send(&mut self, conversation: &str, mut request: Value) {
        if self.skipped {
            return;
        }
        request["user"] = json!(USER);
        request["conversation"] = json!(conversation);
        let bytes = serde_json::to_vec(&request).expect("serialise request");
        let parsed = Request::parse(&bytes).expect("parse request");
        self.replies.push(route(&self.broker, &parsed));
    }

    pub fn last(&self) -> &Envelope {
        self.replies.last().expect("no reply recorded")
    }

    pub fn last_json(&self) -> Value {
        serde_json::to_value(self.last()).expect("serialise reply")
    }

    pub fn layout(&self, zone: Zone) -> ZoneLayout {
        let user = UserId::parse(USER).expect("user id");
        UserRoot::new(&self.storage_root(), &user).zone(zone)
    }

    pub fn data_file(&self, zone: Zone, path: &str) -> PathBuf {
        self.layout(zone).data_dir().join(path)
    }

    pub fn edit_file(&self, zone: Zone, conversation: &str, path: &str) -> PathBuf {
        let conversation = ConversationId::parse(conversation).expect("conversation id");
        self.layout(zone).edit_root(&conversation).join(path)
    }

    pub fn lock_file(&self, zone: Zone, path: &str) -> PathBuf {
        self.layout(zone).locks_dir().join(format!("{path}.lock"))
    }

    pub fn seed(&self, file: &Path, content: &str) {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(file, content).expect("write fixture");
    }

    pub fn read(&self, file: &Path) -> Option<String> {
        fs::read_to_string(file).ok()
    }

    /// Writes a lock record for `conversation` taken `hours` ago.
    pub fn plant_lock(&self, zone: Zone, path: &str, conversation: &str, hours: i64) {
        let user = UserId::parse(USER).expect("user id");
        let owner = ConversationId::parse(conversation).expect("conversation id");
        let entry = EntryPath::parse(path).expect("entry path");
        let taken = OffsetDateTime::now_utc() - Duration::hours(hours);
        let record = LockRecord::new(&user, &owner, &entry, taken);
        let body = serde_json::to_string(&record).expect("serialise lock");
        self.seed(&self.lock_file(zone, path), &body);
    }

    pub fn commit_count(&self, zone: Zone) -> u64 {
        Repository::at(self.layout(zone).data_dir())
            .commit_count()
            .expect("count commits")
    }
}
