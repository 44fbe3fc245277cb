use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AttributeSet;

/// Unique identifier for a registered customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Opaque key of an anonymous browsing session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The owner of a cart: either a registered user or a guest session.
///
/// A cart row belongs to exactly one identity at a time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartIdentity {
    User(UserId),
    Guest(SessionId),
}

impl CartIdentity {
    /// Storage discriminator for the identity column pair.
    pub fn kind(&self) -> &'static str {
        match self {
            CartIdentity::User(_) => "user",
            CartIdentity::Guest(_) => "guest",
        }
    }

    /// Identity value as stored next to [`CartIdentity::kind`].
    pub fn key(&self) -> String {
        match self {
            CartIdentity::User(id) => id.to_string(),
            CartIdentity::Guest(session) => session.to_string(),
        }
    }

    /// Returns the user ID for registered identities.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartIdentity::User(id) => Some(*id),
            CartIdentity::Guest(_) => None,
        }
    }

    /// Rebuilds an identity from its stored `(kind, key)` pair.
    pub fn from_parts(kind: &str, key: &str) -> Option<Self> {
        match kind {
            "user" => Uuid::parse_str(key)
                .ok()
                .map(|uuid| CartIdentity::User(UserId::from_uuid(uuid))),
            "guest" => Some(CartIdentity::Guest(SessionId::new(key))),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Unique identifier for a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartLineId(Uuid);

impl CartLineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CartLineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CartLineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CartLineId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Globally unique identifier for a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrderId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key of one purchasable stock record: a product, optionally narrowed to a size.
///
/// Ordering is total so callers can lock several records in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    pub product_id: ProductId,
    pub size: Option<String>,
}

impl VariantKey {
    pub fn new(product_id: impl Into<ProductId>, size: Option<String>) -> Self {
        Self {
            product_id: product_id.into(),
            size,
        }
    }

    /// The product-level record (no size dimension).
    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self::new(product_id, None)
    }

    /// Variant selected by a cart line's attributes.
    pub fn for_selection(product_id: &ProductId, attributes: &AttributeSet) -> Self {
        Self::new(product_id.clone(), attributes.size().map(str::to_string))
    }

    /// Size column value; the product-level record stores an empty string.
    pub fn size_column(&self) -> &str {
        self.size.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.size {
            Some(size) => write!(f, "{}/{}", self.product_id, size),
            None => write!(f, "{}", self.product_id),
        }
    }
}
