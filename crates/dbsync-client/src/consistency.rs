//! Cross-replica reply comparison.

/// Why a set of replies is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// There were no replies at all.
    NoReplies,
    /// The reply at `index` is empty.
    Empty { index: usize },
    /// The reply at `index` differs from the first one.
    Mismatch { index: usize },
}

/// Returns the first reply if every reply is non-empty and equal to it.
///
/// Replies are checked in order, so the reported index is the first
/// offending one.
pub fn check_consistency<T: AsRef<[u8]>>(replies: &[T]) -> Result<&T, Inconsistency> {
    let (first, rest) = replies.split_first().ok_or(Inconsistency::NoReplies)?;
    if first.as_ref().is_empty() {
        return Err(Inconsistency::Empty { index: 0 });
    }

    for (offset, reply) in rest.iter().enumerate() {
        let index = offset + 1;
        if reply.as_ref().is_empty() {
            return Err(Inconsistency::Empty { index });
        }
        if reply.as_ref() != first.as_ref() {
            return Err(Inconsistency::Mismatch { index });
        }
    }

    Ok(first)
}
