//! Parsed request record handed to the request handler.

use bytes::Bytes;

/// A fully parsed request.
///
/// The session moves the request into the handler; handlers needing the key
/// after routing should use the snapshot on the
/// [`RequestContext`](crate::RequestContext) instead.
#[derive(Clone, Debug, Default)]
pub struct McRequest {
    key: Bytes,
    value: Option<Bytes>,
    flags: u32,
    exptime: u32,
    cas: Option<u64>,
    delta: Option<u64>,
}

impl McRequest {
    /// Create a request for `key` with no payload.
    #[must_use]
    pub fn new(key: Bytes) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Attach a stored-value payload.
    #[must_use]
    pub fn with_value(mut self, value: Bytes) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach client flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Attach an expiration time.
    #[must_use]
    pub fn with_exptime(mut self, exptime: u32) -> Self {
        self.exptime = exptime;
        self
    }

    /// Attach a compare-and-swap token.
    #[must_use]
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    /// Attach an arithmetic delta (`incr`/`decr`).
    #[must_use]
    pub fn with_delta(mut self, delta: u64) -> Self {
        self.delta = Some(delta);
        self
    }

    #[must_use]
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[must_use]
    pub fn exptime(&self) -> u32 {
        self.exptime
    }

    #[must_use]
    pub fn cas(&self) -> Option<u64> {
        self.cas
    }

    #[must_use]
    pub fn delta(&self) -> Option<u64> {
        self.delta
    }
}
