//! Task identity - the registry key used for deduplication

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Equality key of a registrable unit.
///
/// A plain identity is just a name. A keyed identity also carries a typed
/// value, so parameterized dependencies (`compile(core)`, `compile(cli)`)
/// are distinct tasks while repeated declarations of the same parameters
/// share one task.
#[derive(Clone)]
pub struct Identity {
    name: Arc<str>,
    key: Option<Arc<dyn Key>>,
}

trait Key: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn key_eq(&self, other: &dyn Key) -> bool;
    fn key_hash(&self, state: &mut dyn Hasher);
}

impl<T> Key for T
where
    T: Any + Eq + Hash + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_eq(&self, other: &dyn Key) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn key_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

impl Identity {
    /// Identity made of a name only
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            key: None,
        }
    }

    /// Identity made of a name and a parameter value
    pub fn keyed<K>(name: impl Into<String>, key: K) -> Self
    where
        K: Any + Eq + Hash + fmt::Debug + Send + Sync,
    {
        Self {
            name: Arc::from(name.into()),
            key: Some(Arc::new(key)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.key, &other.key) {
            (None, None) => true,
            (Some(a), Some(b)) => a.key_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        if let Some(key) = &self.key {
            key.key_hash(state);
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}({:?})", self.name, key),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
