//! Keyed record store.
//!
//! Every entity lives in a `HashMap` keyed by its id inside one [`Tables`]
//! struct. All maps sit behind a single `tokio::sync::RwLock`, so a write
//! transaction that touches several entities (an order decrementing stock
//! for each line item, say) is atomic with respect to every other request.
//!
//! Writes go through [`Store::write`], which hands the closure a [`Txn`].
//! The transaction keeps an undo log: if the closure returns an error, or
//! the persistence backend rejects the changes, every mutation is rolled
//! back before the lock is released.
//!
//! # Persistence
//!
//! With a [`Backend::Postgres`] backend each committed transaction upserts
//! the JSON of every touched record into the `records` table (and deletes
//! removed ones) inside a single database transaction. On startup
//! [`Store::open`] loads every row back into memory.

mod backend;

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use tradepost_core::{
    AdjustmentId, ChatRoomId, MessageId, NotificationId, OrderId, ProductId, ReviewId, ShipmentId,
    TicketCommentId, TicketId, UserId,
};

use crate::models::{
    ChatRoom, InventoryItem, Message, Notification, Order, Product, Review, Shipment,
    StockAdjustment, Ticket, TicketComment, User,
};

pub use backend::{Backend, Change, create_pool};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// All entity maps.
#[derive(Debug, Default)]
pub struct Tables {
    pub users: HashMap<UserId, User>,
    pub products: HashMap<ProductId, Product>,
    pub reviews: HashMap<ReviewId, Review>,
    pub tickets: HashMap<TicketId, Ticket>,
    pub ticket_comments: HashMap<TicketCommentId, TicketComment>,
    pub inventory: HashMap<ProductId, InventoryItem>,
    pub adjustments: HashMap<AdjustmentId, StockAdjustment>,
    pub orders: HashMap<OrderId, Order>,
    pub shipments: HashMap<ShipmentId, Shipment>,
    pub notifications: HashMap<NotificationId, Notification>,
    pub rooms: HashMap<ChatRoomId, ChatRoom>,
    pub messages: HashMap<MessageId, Message>,
}

/// An entity that lives in one of the [`Tables`] maps.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored in the `records.kind` column.
    const KIND: &'static str;

    type Id: Copy + Eq + Hash + Into<Uuid> + From<Uuid> + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
    fn table(tables: &Tables) -> &HashMap<Self::Id, Self>;
    fn table_mut(tables: &mut Tables) -> &mut HashMap<Self::Id, Self>;
}

macro_rules! records {
    ($($ty:ty => $kind:literal, $id:ty, $field:ident, |$r:ident| $key:expr;)+) => {
        $(
            impl Record for $ty {
                const KIND: &'static str = $kind;
                type Id = $id;

                fn id(&self) -> Self::Id {
                    let $r = self;
                    $key
                }

                fn table(tables: &Tables) -> &HashMap<Self::Id, Self> {
                    &tables.$field
                }

                fn table_mut(tables: &mut Tables) -> &mut HashMap<Self::Id, Self> {
                    &mut tables.$field
                }
            }
        )+

        impl Tables {
            /// Insert a raw stored record into the matching map.
            fn load_raw(&mut self, kind: &str, body: serde_json::Value) -> Result<(), StoreError> {
                match kind {
                    $($kind => {
                        let record: $ty = serde_json::from_value(body)?;
                        self.$field.insert(record.id(), record);
                    })+
                    other => {
                        return Err(StoreError::DataCorruption(format!(
                            "unknown record kind '{other}'"
                        )));
                    }
                }
                Ok(())
            }

            /// Current JSON of a record, or `None` if it no longer exists.
            fn snapshot(&self, kind: &str, id: Uuid) -> Result<Option<serde_json::Value>, StoreError> {
                match kind {
                    $($kind => self
                        .$field
                        .get(&<$id>::from(id))
                        .map(serde_json::to_value)
                        .transpose()
                        .map_err(StoreError::from),)+
                    other => Err(StoreError::DataCorruption(format!(
                        "unknown record kind '{other}'"
                    ))),
                }
            }
        }
    };
}

records! {
    User => "user", UserId, users, |r| r.id;
    Product => "product", ProductId, products, |r| r.id;
    Review => "review", ReviewId, reviews, |r| r.id;
    Ticket => "ticket", TicketId, tickets, |r| r.id;
    TicketComment => "ticket_comment", TicketCommentId, ticket_comments, |r| r.id;
    InventoryItem => "inventory", ProductId, inventory, |r| r.product_id;
    StockAdjustment => "stock_adjustment", AdjustmentId, adjustments, |r| r.id;
    Order => "order", OrderId, orders, |r| r.id;
    Shipment => "shipment", ShipmentId, shipments, |r| r.id;
    Notification => "notification", NotificationId, notifications, |r| r.id;
    ChatRoom => "chat_room", ChatRoomId, rooms, |r| r.id;
    Message => "message", MessageId, messages, |r| r.id;
}

impl Tables {
    /// Look up any record by id.
    pub fn get<R: Record>(&self, id: R::Id) -> Option<&R> {
        R::table(self).get(&id)
    }

    /// Iterate every record of one kind.
    pub fn all<R: Record>(&self) -> impl Iterator<Item = &R> {
        R::table(self).values()
    }
}

type Undo = Box<dyn FnOnce(&mut Tables) + Send>;

/// A write transaction over [`Tables`].
///
/// Mutations are applied immediately so later reads in the same closure see
/// them; the undo log restores the previous state on rollback.
pub struct Txn<'a> {
    tables: &'a mut Tables,
    touched: BTreeSet<(&'static str, Uuid)>,
    undo: Vec<Undo>,
}

impl<'a> Txn<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            touched: BTreeSet::new(),
            undo: Vec::new(),
        }
    }

    /// Read access to every table, including this transaction's writes.
    #[must_use]
    pub fn tables(&self) -> &Tables {
        self.tables
    }

    pub fn get<R: Record>(&self, id: R::Id) -> Option<&R> {
        self.tables.get(id)
    }

    /// Insert or replace a record.
    pub fn put<R: Record>(&mut self, record: R) {
        let id = record.id();
        let previous = R::table_mut(self.tables).insert(id, record);
        self.touched.insert((R::KIND, id.into()));
        self.undo.push(Box::new(move |tables| {
            let table = R::table_mut(tables);
            match previous {
                Some(previous) => {
                    table.insert(id, previous);
                }
                None => {
                    table.remove(&id);
                }
            }
        }));
    }

    /// Mutate a record in place, returning the updated value.
    pub fn update<R: Record>(&mut self, id: R::Id, f: impl FnOnce(&mut R)) -> Option<&R> {
        let mut record = self.get::<R>(id)?.clone();
        f(&mut record);
        self.put(record);
        self.get(id)
    }

    /// Remove a record.
    pub fn remove<R: Record>(&mut self, id: R::Id) -> Option<R> {
        let removed = R::table_mut(self.tables).remove(&id)?;
        self.touched.insert((R::KIND, id.into()));
        let restore = removed.clone();
        self.undo.push(Box::new(move |tables| {
            R::table_mut(tables).insert(id, restore);
        }));
        Some(removed)
    }

    /// Remove every record of a kind matching `predicate`.
    pub fn remove_where<R: Record>(&mut self, predicate: impl Fn(&R) -> bool) -> usize {
        let ids: Vec<R::Id> = self
            .tables
            .all::<R>()
            .filter(|r| predicate(r))
            .map(Record::id)
            .collect();
        let count = ids.len();
        for id in ids {
            self.remove::<R>(id);
        }
        count
    }

    fn rollback(self) {
        let Self { tables, undo, .. } = self;
        for step in undo.into_iter().rev() {
            step(tables);
        }
    }

    /// Net changes to persist, one per touched record.
    fn changes(&self) -> Result<Vec<Change>, StoreError> {
        self.touched
            .iter()
            .map(|&(kind, id)| {
                Ok(match self.tables.snapshot(kind, id)? {
                    Some(body) => Change::Upsert { kind, id, body },
                    None => Change::Delete { kind, id },
                })
            })
            .collect()
    }
}

/// The application's record store.
pub struct Store {
    tables: RwLock<Tables>,
    backend: Backend,
}

impl Store {
    /// A purely in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            backend: Backend::Memory,
        }
    }

    /// Open a store on `backend`, loading any persisted records.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the records cannot be read or decoded.
    pub async fn open(backend: Backend) -> Result<Self, StoreError> {
        let mut tables = Tables::default();
        let rows = backend.load().await?;
        let count = rows.len();
        for (kind, body) in rows {
            tables.load_raw(&kind, body)?;
        }
        tracing::info!(records = count, backend = backend.name(), "Store loaded");

        Ok(Self {
            tables: RwLock::new(tables),
            backend,
        })
    }

    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Run a read-only closure against a consistent snapshot.
    pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().await;
        f(&tables)
    }

    /// Run a write transaction.
    ///
    /// The closure's mutations are kept only if it returns `Ok` and the
    /// backend accepts them; otherwise they are undone.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the persistence failure converted
    /// into `E`.
    pub async fn write<T, E>(&self, f: impl FnOnce(&mut Txn<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut tables = self.tables.write().await;
        let mut txn = Txn::new(&mut tables);

        let value = match f(&mut txn) {
            Ok(value) => value,
            Err(e) => {
                txn.rollback();
                return Err(e);
            }
        };

        if self.backend.is_persistent() {
            let persisted = match txn.changes() {
                Ok(changes) => self.backend.persist(&changes).await,
                Err(e) => Err(e),
            };
            if let Err(e) = persisted {
                tracing::error!(error = %e, "Persisting transaction failed, rolling back");
                txn.rollback();
                return Err(e.into());
            }
        }

        Ok(value)
    }

    /// Whether the backend is reachable.
    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }
}
