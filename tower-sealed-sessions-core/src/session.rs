//! A session which allows HTTP applications to associate data with visitors.
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::OnceCell;
use tower_cookies::Cookies;

use crate::{session_store, Id, Options, SessionStore};

/// Key under which flashes are kept unless another one is given.
pub const DEFAULT_FLASH_KEY: &str = "_flash";

/// Key whose value, when present, is used as the record's modification time.
pub const MODIFIED_KEY: &str = "modified";

pub type Data = HashMap<String, Value>;

/// Session errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Maps `serde_json` errors.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Maps `session_store::Error` errors.
    #[error(transparent)]
    Store(#[from] session_store::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Where a session is in its life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// Not yet persisted anywhere.
    #[default]
    New,

    /// Loaded from, or saved to, a store.
    Loaded,

    /// Flushed; saving removes it from the store.
    Deleted,
}

/// The state a [`SessionStore`] loads and saves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionData {
    /// `None` until a server-side store assigns one.
    pub id: Option<Id>,
    pub values: Data,
    pub options: Options,
    pub status: Status,
}

impl SessionData {
    /// A fresh session carrying the store's options.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// A session that was found in a store.
    pub fn loaded(id: Option<Id>, values: Data, options: Options) -> Self {
        Self {
            id,
            values,
            options,
            status: Status::Loaded,
        }
    }

    pub fn is_new(&self) -> bool {
        self.status == Status::New
    }

    /// The modification time to persist.
    ///
    /// A `"modified"` value must be an RFC 3339 timestamp. Without one, the
    /// current time is used.
    pub fn modified(&self) -> session_store::Result<OffsetDateTime> {
        match self.values.get(MODIFIED_KEY) {
            Some(Value::String(modified)) => OffsetDateTime::parse(modified, &Rfc3339)
                .map_err(|_| session_store::Error::InvalidModified),
            Some(_) => Err(session_store::Error::InvalidModified),
            None => Ok(OffsetDateTime::now_utc()),
        }
    }
}

/// What a server-side backend persists for one session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: Id,
    /// Codec-encoded session values.
    pub data: String,
    pub modified: OffsetDateTime,
    pub expiry_date: OffsetDateTime,
}

struct Inner {
    // Filled on first use.
    data: OnceCell<Mutex<SessionData>>,
    written: AtomicBool,
}

/// A session which allows HTTP applications to associate key-value pairs with
/// visitors.
///
/// The handle is cheap to clone and every clone refers to the same state. It
/// is lazy: nothing is read from the store until a method needs the session's
/// values.
#[derive(Clone)]
pub struct Session {
    name: Arc<str>,
    store: Arc<dyn SessionStore>,
    cookies: Cookies,
    inner: Arc<Inner>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("data", &self.inner.data.get().map(|data| data.lock().clone()))
            .field("written", &self.is_written())
            .finish()
    }
}

impl Session {
    /// Creates a new session bound to the cookie `name` of a request's jar.
    ///
    /// This method is lazy and does not invoke the overhead of talking to the
    /// backing store.
    pub fn new(name: impl Into<Arc<str>>, store: Arc<dyn SessionStore>, cookies: Cookies) -> Self {
        Self {
            name: name.into(),
            store,
            cookies,
            inner: Arc::new(Inner {
                data: OnceCell::new(),
                written: AtomicBool::new(false),
            }),
        }
    }

    async fn data(&self) -> Result<&Mutex<SessionData>> {
        self.inner
            .data
            .get_or_try_init(|| async {
                tracing::trace!(name = %self.name, "loading session");
                let data = self.store.load(&self.cookies, &self.name).await?;
                Ok::<_, Error>(Mutex::new(data))
            })
            .await
    }

    fn mark_written(&self) {
        self.inner.written.store(true, atomic::Ordering::Release);
    }

    /// Inserts a `impl Serialize` value into the session.
    ///
    /// # Errors
    ///
    /// - This method can fail when [`serde_json::to_value`] fails.
    /// - If the session has not been loaded yet, loading it can fail.
    pub async fn insert(&self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(&value)?;
        self.data()
            .await?
            .lock()
            .values
            .insert(key.to_string(), value);
        self.mark_written();
        Ok(())
    }

    /// Gets a value from the store.
    ///
    /// # Errors
    ///
    /// - This method can fail if [`serde_json::from_value`] fails.
    /// - If the session has not been loaded yet, loading it can fail.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get_value(key)
            .await?
            .map(serde_json::from_value)
            .transpose()?)
    }

    /// Gets a `serde_json::Value` from the store.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data().await?.lock().values.get(key).cloned())
    }

    /// Removes a value from the store, retuning the value of the key if it was
    /// present in the underlying map.
    ///
    /// # Errors
    ///
    /// - This method can fail if [`serde_json::from_value`] fails.
    /// - If the session has not been loaded yet, loading it can fail.
    pub async fn remove<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .remove_value(key)
            .await?
            .map(serde_json::from_value)
            .transpose()?)
    }

    /// Removes a `serde_json::Value` from the session.
    pub async fn remove_value(&self, key: &str) -> Result<Option<Value>> {
        let value = self.data().await?.lock().values.remove(key);
        self.mark_written();
        Ok(value)
    }

    /// Clears the session of all data but does not delete it from the store.
    ///
    /// Only a session that had values is marked written.
    pub async fn clear(&self) -> Result<()> {
        let data = self.data().await?;
        let mut data = data.lock();
        if !data.values.is_empty() {
            data.values.clear();
            self.mark_written();
        }
        Ok(())
    }

    /// Adds a flash message under [`DEFAULT_FLASH_KEY`].
    pub async fn add_flash(&self, value: impl Serialize) -> Result<()> {
        self.add_flash_with_key(DEFAULT_FLASH_KEY, value).await
    }

    /// Adds a flash message under `key`.
    ///
    /// Flashes accumulate until they are read with
    /// [`flashes_with_key`](Self::flashes_with_key).
    pub async fn add_flash_with_key(&self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(&value)?;
        {
            let data = self.data().await?;
            let mut data = data.lock();
            let flashes = data
                .values
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match flashes {
                Value::Array(flashes) => flashes.push(value),
                other => *other = Value::Array(vec![value]),
            }
        }
        self.mark_written();
        Ok(())
    }

    /// Returns and removes the flashes under [`DEFAULT_FLASH_KEY`].
    pub async fn flashes<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.flashes_with_key(DEFAULT_FLASH_KEY).await
    }

    /// Returns and removes the flashes under `key`.
    ///
    /// The session is marked written even when there were none.
    pub async fn flashes_with_key<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let flashes = self.data().await?.lock().values.remove(key);
        self.mark_written();

        let flashes = match flashes {
            Some(Value::Array(flashes)) => flashes,
            Some(flash) => vec![flash],
            None => Vec::new(),
        };

        Ok(flashes
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?)
    }

    /// Replaces the store's cookie options for this session.
    ///
    /// The new options apply the next time the session is saved; this method
    /// alone does not cause a save.
    pub async fn set_options(&self, options: Options) -> Result<()> {
        self.data().await?.lock().options = options;
        Ok(())
    }

    /// The cookie options this session will be saved with.
    pub async fn options(&self) -> Result<Options> {
        Ok(self.data().await?.lock().options.clone())
    }

    /// Clears all values and marks the session for deletion from the store.
    ///
    /// The response will carry a removal cookie.
    pub async fn flush(&self) -> Result<()> {
        {
            let data = self.data().await?;
            let mut data = data.lock();
            data.values.clear();
            data.status = Status::Deleted;
        }
        self.mark_written();
        Ok(())
    }

    /// The session's id, if it has been loaded and has one.
    ///
    /// Cookie sessions never have an id.
    pub fn id(&self) -> Option<Id> {
        self.inner.data.get().and_then(|data| data.lock().id)
    }

    /// Whether the session was created during this request.
    pub async fn is_new(&self) -> Result<bool> {
        Ok(self.data().await?.lock().is_new())
    }

    /// Whether the session has been written since it was loaded or last
    /// saved.
    pub fn is_written(&self) -> bool {
        self.inner.written.load(atomic::Ordering::Acquire)
    }

    /// The name of the session cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persists the session through its store.
    ///
    /// A session that was never loaded has nothing to save.
    ///
    /// # Errors
    ///
    /// - If saving to the store fails, we fail with [`Error::Store`].
    pub async fn save(&self) -> Result<()> {
        let Some(cell) = self.inner.data.get() else {
            return Ok(());
        };

        let mut data = cell.lock().clone();
        self.store.save(&self.cookies, &self.name, &mut data).await?;

        {
            let mut current = cell.lock();
            current.id = data.id;
            current.status = data.status;
        }
        self.inner.written.store(false, atomic::Ordering::Release);

        Ok(())
    }
}
