use std::fmt;

use crate::MAX_TXN_OBJS;

const WRITE_BIT: u64 = 1 << 63;

/// A reference to a named object, with read or write intent.
///
/// The low 63 bits carry the object id; the top bit marks write intent.
/// Identity comparisons always mask the intent bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectRef(u64);

impl ObjectRef {
    /// Creates a read reference to `id`.
    pub fn read(id: u64) -> Self {
        ObjectRef(id & !WRITE_BIT)
    }

    /// Creates a write reference to `id`.
    pub fn write(id: u64) -> Self {
        ObjectRef(id | WRITE_BIT)
    }

    /// The object id, with the intent bit masked off.
    pub fn id(self) -> u64 {
        self.0 & !WRITE_BIT
    }

    /// Returns `true` if this reference carries write intent.
    pub fn is_write(self) -> bool {
        self.0 & WRITE_BIT != 0
    }

    /// Returns `true` if the two references name the same object and at
    /// least one of them writes it.
    pub fn conflicts_with(self, other: ObjectRef) -> bool {
        self.id() == other.id() && (self.is_write() || other.is_write())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let intent = if self.is_write() { "w" } else { "r" };
        write!(f, "{}{}", intent, self.id())
    }
}

/// An opaque transaction id.
///
/// This is the value that flows through the scheduled and done rings.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable transaction descriptor.
///
/// Carries the id, a caller-defined auxiliary payload the scheduler never
/// interprets, and up to [`MAX_TXN_OBJS`] object references stored inline.
/// The descriptor is `Copy`; the dispatcher keeps its own copy for the
/// transaction's active lifetime.
///
/// Duplicate object ids within one transaction are not rejected; they only
/// make the conflict check more conservative.
#[derive(Clone, Copy, Debug)]
pub struct Transaction {
    id: TxnId,
    aux: u64,
    objs: [ObjectRef; MAX_TXN_OBJS],
    num_objs: u8,
}

impl Transaction {
    /// Creates a transaction with no object references.
    pub fn new(id: TxnId, aux: u64) -> Self {
        Transaction {
            id,
            aux,
            objs: [ObjectRef::read(0); MAX_TXN_OBJS],
            num_objs: 0,
        }
    }

    /// Adds a read reference. Chainable.
    ///
    /// # Panics
    ///
    /// Panics if the transaction already holds [`MAX_TXN_OBJS`] references.
    pub fn read(self, id: u64) -> Self {
        self.with_obj(ObjectRef::read(id))
    }

    /// Adds a write reference. Chainable.
    ///
    /// # Panics
    ///
    /// Panics if the transaction already holds [`MAX_TXN_OBJS`] references.
    pub fn write(self, id: u64) -> Self {
        self.with_obj(ObjectRef::write(id))
    }

    fn with_obj(mut self, obj: ObjectRef) -> Self {
        assert!(
            (self.num_objs as usize) < MAX_TXN_OBJS,
            "transaction {} holds more than {} objects",
            self.id,
            MAX_TXN_OBJS
        );
        self.objs[self.num_objs as usize] = obj;
        self.num_objs += 1;
        self
    }

    /// The transaction id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// The caller-defined auxiliary payload.
    pub fn aux(&self) -> u64 {
        self.aux
    }

    /// The object references of this transaction.
    pub fn objects(&self) -> &[ObjectRef] {
        &self.objs[..self.num_objs as usize]
    }

    /// Returns `true` if any object is shared with `other` and at least one
    /// of the two references writes it.
    pub fn conflicts_with(&self, other: &Transaction) -> bool {
        self.objects()
            .iter()
            .any(|a| other.objects().iter().any(|b| a.conflicts_with(*b)))
    }
}
