//! 📡 The Cosmos store — HTTP, headers, and a database that bills by the ask.
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. A DATACENTER YOU WILL NEVER SEE — SOMEWHERE
//!
//! Your document arrives at the front desk of a globally distributed
//! database. It has traveled through TLS. It is wearing its best
//! `content-type`. The clerk stamps it `is-upsert: true` — no questions
//! about whether it already lives here, it lives here NOW — and then one of
//! two things happens:
//!
//! 201. Welcome home.
//!
//! Or: 429. "We are experiencing higher than normal call volume." The clerk
//! slides a note across the desk with a number of milliseconds on it. You
//! will wait that long. You will come back. You will be charged either way.
//!
//! 🦆 (the duck asked about the pricing model. the duck was escorted out.)
//!
//! ---
//!
//! Mechanically this module is three verbs against a REST surface:
//! - `connect` — build one pooled client, then prove the database and the
//!   collection actually exist before we invest any feelings.
//! - `ensure_composite_indexes` — read-modify-write the collection's
//!   indexing policy so `ORDER BY` queries downstream don't require miracles.
//! - `upsert` — POST one document, map the response into Ok / Overloaded /
//!   Fatal, and let the loader decide what that means for its evening.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json, value::RawValue};
use tracing::{debug, info, trace};

use crate::store::{DocumentStore, WriteError};

/// 📜 The REST API version we pin. Upgrading this is a decision, not a drift.
const COSMOS_API_VERSION: &str = "2018-12-31";

/// 🔄 The store's back-off suggestion header on a 429, in milliseconds.
const RETRY_AFTER_MS_HEADER: &str = "x-ms-retry-after-ms";

/// 💤 What we sleep when the store says "busy" but forgets to say how long.
/// One second: long enough to be polite, short enough to be employed.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(1000);

/// 🧮 The number of composite indexes the collection must end up with.
const COMPOSITE_INDEX_COUNT: usize = 2;

// -- 📂 CosmosStoreConfig — co-located with the store that uses it. Ethos pattern, baby. 🎯
// KNOWLEDGE GRAPH: config lives next to the backend it configures. This is intentional.
// It avoids the "where the heck is that config defined" scavenger hunt at 2am during an incident.
#[derive(Debug, Deserialize, Clone)]
pub struct CosmosStoreConfig {
    /// 📡 Account name ("mystuff") or a full base URL ("http://localhost:8081").
    /// A bare account name gets the standard `https://{name}.documents.azure.com:443`
    /// treatment; anything with "://" in it is trusted verbatim — that's how the
    /// emulator and the test double get in the door.
    pub endpoint: String,
    /// 🔒 The access key. Goes in the `authorization` header as-is. Yes, it will
    /// show up in a Debug print of this struct. So will your regrets. Don't log it.
    pub key: String,
    /// 📦 Database name.
    pub database: String,
    /// 📦 Collection name.
    pub collection: String,
    /// ⏱️ Per-request timeout. Generous, because bulk writes against a busy
    /// store can legitimately take a while before the 429s even start.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// ⏱️ Connect timeout. If the TLS handshake takes longer than this, the
    /// endpoint is wrong or the network is a rumor. Fail fast, fail early.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// 🔧 Serde's errand boys. The attributes up top are the boss.
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl CosmosStoreConfig {
    /// 🏗️ The four coordinates of a document store, timeouts on the house.
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            database: database.into(),
            collection: collection.into(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// 📡 Expands an endpoint into a base URL.
///
/// "mystuff" → `https://mystuff.documents.azure.com:443`
/// "http://localhost:8081/" → `http://localhost:8081` (trailing-slash hygiene —
/// one slash of difference, infinite suffering of difference)
fn base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.contains("://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("https://{endpoint}.documents.azure.com:443")
    }
}

/// 📡 The store side of the pipeline — one pooled HTTP client, two URLs,
/// and a key it repeats to everyone it meets.
///
/// `upsert` takes `&self` and the client pools connections internally, so a
/// single `CosmosStore` is shared across every loader task via `Arc`. One
/// handshake budget, many writers. The connection pool is sized off the
/// loader cap at connect time — the writers ARE the traffic.
///
/// 🚰 Think of this as the drain at the end of the pipeline. The last stop.
/// Knock knock. Who's there? HTTP POST. HTTP POST who? HTTP POST your
/// document and hope the request units hold out.
#[derive(Debug)]
pub(crate) struct CosmosStore {
    client: reqwest::Client,
    /// 📦 `{base}/dbs/{db}/colls/{coll}` — the collection resource itself.
    coll_url: String,
    /// 📤 `{coll_url}/docs` — where the documents actually land.
    docs_url: String,
    key: String,
}

impl CosmosStore {
    /// 🚀 Stand up a `CosmosStore`, fully wired and vetted.
    ///
    /// This constructor does three things:
    /// 1. Builds the `reqwest::Client` with explicit timeouts and a pool
    ///    sized `max_loaders * 2` — enough sockets that the workers never
    ///    queue on each other, not so many that the kernel files a complaint.
    /// 2. Confirms the database exists with a GET. A handshake. A hello.
    ///    An "are you even there?"
    /// 3. Confirms the collection exists the same way. Loading into a
    ///    nonexistent collection is a skill issue we catch at init time,
    ///    not at 10,000 documents deep. You're welcome.
    pub(crate) async fn connect(config: &CosmosStoreConfig, max_loaders: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(max_loaders.max(1) * 2)
            .build()
            // -- 💀 "Failed to initialize http client" — a tragedy in one act.
            // -- The curtain rises. reqwest::Client::builder() enters, full of promise.
            // -- It calls .build(). The TLS stack hesitates. The OS shrugs.
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a missing cert bundle or a cursed system OpenSSL. Either way: tragic.")?;

        let base = base_url(&config.endpoint);
        let db_url = format!("{}/dbs/{}", base, config.database);
        let coll_url = format!("{}/colls/{}", db_url, config.collection);
        let docs_url = format!("{}/docs", coll_url);

        // -- 📡 Existence check #1: the database. If this 404s, no amount of
        // -- loading enthusiasm will fix it, so we stop before the meter starts.
        let response = client
            .get(&db_url)
            .header("authorization", &config.key)
            .header("x-ms-version", COSMOS_API_VERSION)
            .send()
            .await
            .context(format!(
                "💀 Reached out to '{}' to confirm the database exists. Got ghosted. \
                The endpoint may be wrong, the emulator may be napping, or the network \
                is giving us the silent treatment. Either way: we cannot proceed, dignity intact.",
                db_url
            ))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Database '{}' does not exist, or won't admit it ({}). We knocked. We waited. \
                The door remained unanswered. Check the name, check the key, check the response: '{}'",
                config.database,
                status,
                body
            );
        }
        debug!("✅ database '{}' exists and is taking visitors", config.database);

        // -- 📡 Existence check #2: the collection. Same dance, one level deeper.
        let response = client
            .get(&coll_url)
            .header("authorization", &config.key)
            .header("x-ms-version", COSMOS_API_VERSION)
            .send()
            .await
            .context(format!(
                "💀 Asked '{}' whether the collection exists and the request itself fell over. \
                Schrodinger's collection. Very advanced. Very unhelpful.",
                coll_url
            ))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Collection '{}' does not exist and never has, as far as we can tell ({}). \
                You may want to create it, or check your spelling — easy mistake, no judgment, \
                but also: please fix it. The store said: '{}'",
                config.collection,
                status,
                body
            );
        }
        debug!("✅ collection '{}' exists — welcome mat is out", config.collection);

        Ok(Self {
            client,
            coll_url,
            docs_url,
            key: config.key.clone(),
        })
    }

    /// 🧱 Makes sure the collection carries the two composite indexes the
    /// downstream search queries lean on: `(textSearch, actorId)` and
    /// `(textSearch, movieId)`, both ascending.
    ///
    /// This is a read-modify-write on the collection resource: GET the whole
    /// thing, graft the composite indexes onto its indexing policy, PUT the
    /// whole thing back, then VERIFY the response actually carries both.
    /// Index provisioning on a managed store is eventually-agreeable at
    /// best, and "the PUT returned 200" is not the same claim as "the
    /// indexes exist." We check the claim we actually care about.
    ///
    /// Already provisioned (exactly two composite indexes present)? Then we
    /// touch nothing and leave the way we came in. 🚪
    pub(crate) async fn ensure_composite_indexes(&self) -> Result<()> {
        // 📥 Step 1: fetch the collection resource, policy and all.
        let response = self
            .client
            .get(&self.coll_url)
            .header("authorization", &self.key)
            .header("x-ms-version", COSMOS_API_VERSION)
            .send()
            .await
            .context("💀 Couldn't fetch the collection to inspect its indexing policy. The indexes may be fine. We will never know. Refusing to guess.")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The collection read for index inspection came back {} — body: '{}'. \
                Can't provision indexes on a collection we can't read.",
                status,
                body
            );
        }
        let body = response
            .text()
            .await
            .context("💀 The collection response body evaporated mid-read. Networks, man.")?;
        let mut collection: Value = serde_json::from_str(&body).context(
            "💀 The collection resource wasn't JSON. That's not a collection, that's a prank.",
        )?;

        // 🔍 Step 2: count what's already there.
        let existing = collection
            .pointer("/indexingPolicy/compositeIndexes")
            .and_then(Value::as_array)
            .map_or(0, |indexes| indexes.len());
        if existing == COMPOSITE_INDEX_COUNT {
            debug!("✅ composite indexes already in place — touching nothing, leaving quietly");
            return Ok(());
        }
        info!(
            "🧱 found {} composite index(es), want {} — provisioning",
            existing, COMPOSITE_INDEX_COUNT
        );

        // 🏗️ Step 3: graft the desired indexes onto the policy.
        // The search layer sorts by textSearch and then disambiguates by the
        // entity id, so each pair leads with textSearch.
        let desired = json!([
            [
                { "path": "/textSearch", "order": "ascending" },
                { "path": "/actorId", "order": "ascending" }
            ],
            [
                { "path": "/textSearch", "order": "ascending" },
                { "path": "/movieId", "order": "ascending" }
            ]
        ]);
        let Some(collection_obj) = collection.as_object_mut() else {
            anyhow::bail!(
                "💀 The collection resource parsed as JSON but not as an object. \
                We asked for a collection and received modern art."
            );
        };
        let policy = collection_obj
            .entry("indexingPolicy")
            .or_insert_with(|| json!({}));
        let Some(policy_obj) = policy.as_object_mut() else {
            anyhow::bail!(
                "💀 indexingPolicy exists but isn't an object. Someone has been \
                freehanding the collection resource and it shows."
            );
        };
        policy_obj.insert("compositeIndexes".to_string(), desired);

        // 📤 Step 4: PUT the modified resource back. The whole resource —
        // this API replaces, it does not patch.
        let response = self
            .client
            .put(&self.coll_url)
            .header("authorization", &self.key)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("content-type", "application/json")
            .body(collection.to_string())
            .send()
            .await
            .context("💀 The index-provisioning PUT never made it to the store. The policy was rendered with love and the network said 'nah.'")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The store rejected the new indexing policy ({}). Response: '{}'. \
                The indexes remain unprovisioned. The queries remain slow. We remain stopped.",
                status,
                body
            );
        }

        // 🔍 Step 5: verify what came back. Trust, but count.
        let body = response
            .text()
            .await
            .context("💀 The index-provisioning response body evaporated mid-read.")?;
        let replaced: Value = serde_json::from_str(&body)
            .context("💀 The replace-collection response wasn't JSON. Suspicious. Unverifiable. Fatal.")?;
        let verified = replaced
            .pointer("/indexingPolicy/compositeIndexes")
            .and_then(Value::as_array)
            .map_or(0, |indexes| indexes.len());
        if verified != COMPOSITE_INDEX_COUNT {
            anyhow::bail!(
                "💀 Index create failed: asked for {} composite indexes, the store's reply shows {}. \
                A 2xx with the wrong policy is still a failure — we count what came back, not the status code.",
                COMPOSITE_INDEX_COUNT,
                verified
            );
        }
        info!("✅ composite indexes provisioned and verified — the ORDER BYs shall be swift");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for CosmosStore {
    /// 📤 POST one document at the collection's docs endpoint, upsert-style.
    ///
    /// The response mapping IS the contract:
    /// - 2xx → Ok. Created or replaced, we don't care which. Idempotence, baby.
    /// - 429 → [`WriteError::Overloaded`] carrying the store's own
    ///   `x-ms-retry-after-ms` suggestion (or our polite 1s default when the
    ///   store is too busy to even say how busy it is).
    /// - anything else → [`WriteError::Fatal`] with status and body, because
    ///   a 401 retried forever is just a DoS with good intentions.
    async fn upsert(&self, doc: &RawValue) -> Result<(), WriteError> {
        let response = self
            .client
            .post(&self.docs_url)
            .header("authorization", &self.key)
            .header("x-ms-version", COSMOS_API_VERSION)
            // ⚠️ the load-bearing header: same id = replace, new id = create.
            // Without it, reruns after a crash would rain 409s. With it,
            // "crash and rerun" is a recovery strategy.
            .header("x-ms-documentdb-is-upsert", "true")
            .header("content-type", "application/json")
            // 📦 the document travels as its original bytes. parsed once at
            // read time, never re-serialized. what the file said, the store gets.
            .body(doc.get().to_owned())
            .send()
            .await
            .map_err(|err| {
                anyhow::Error::new(err).context(
                    "💀 The upsert never reached the store. We formed the request with artisanal care, called .send(), and the network dropped the packet like a love letter answered with ECONNRESET.",
                )
            })?;

        let status = response.status();
        if status.is_success() {
            // ✅ landed. created or replaced. either way: no cap, the doc slaps.
            trace!("🚀 upsert landed ({status})");
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // 🔄 the store is drowning and sent a note about it. read the note.
            let retry_after = response
                .headers()
                .get(RETRY_AFTER_MS_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            trace!("🔄 429 from the store — suggested nap: {retry_after:?}");
            return Err(WriteError::Overloaded { retry_after });
        }

        // 💀 We got a response! It just... wasn't good news. The body usually
        // explains which expectation we violated. Store error bodies are
        // poetry. Dark poetry.
        let body = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "💀 The upsert arrived and the store looked at our document and said '{}'. \
            The body of the response read: '{}'. This is not a busy signal — no retry will fix it.",
            status,
            body
        )
        .into())
    }
}
