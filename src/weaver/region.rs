//! The protected region wrapping a woven body.

use crate::{classfile::ExceptionTableEntry, Result};

/// Internal name of `java.lang.Throwable`, the type the region catches.
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";

/// The single try/catch-all span installed around a woven method body.
///
/// `start` is the first offset after the entry hook has stored the context handle; `end` is
/// the handler's own first offset, so the region covers every original instruction and every
/// injected normal-exit sequence but never the handler itself. The region's exception table
/// entry is appended after all original entries, which gives it the lowest priority: the
/// original try/catch blocks still see their exceptions first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRegion {
    /// First covered offset
    pub start: u16,
    /// First offset past the region, equal to `handler`
    pub end: u16,
    /// Entry of the exceptional-exit handler
    pub handler: u16,
    /// `Class` index of `java/lang/Throwable`
    pub catch_type: u16,
}

impl ProtectedRegion {
    /// Build a region from resolved code offsets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the region is empty, the handler lies inside it,
    /// or an offset does not fit the exception table's 16-bit fields.
    pub fn new(start: usize, end: usize, handler: usize, catch_type: u16) -> Result<Self> {
        let narrow = |offset: usize| {
            u16::try_from(offset)
                .map_err(|_| malformed_error!("Region offset {} exceeds 65535", offset))
        };

        if start >= end {
            return Err(malformed_error!(
                "Protected region [{}, {}) is empty",
                start,
                end
            ));
        }
        if handler < end && handler >= start {
            return Err(malformed_error!(
                "Handler {} lies inside its own region [{}, {})",
                handler,
                start,
                end
            ));
        }

        Ok(ProtectedRegion {
            start: narrow(start)?,
            end: narrow(end)?,
            handler: narrow(handler)?,
            catch_type,
        })
    }

    /// Returns `true` if the instruction at `offset` is covered.
    #[must_use]
    pub fn covers(&self, offset: u16) -> bool {
        (self.start..self.end).contains(&offset)
    }

    /// The exception table row for this region.
    #[must_use]
    pub fn entry(&self) -> ExceptionTableEntry {
        ExceptionTableEntry {
            start_pc: self.start,
            end_pc: self.end,
            handler_pc: self.handler,
            catch_type: self.catch_type,
        }
    }

    /// Append this region's row after `table`, giving it the lowest priority.
    pub fn attach(&self, table: &mut Vec<ExceptionTableEntry>) {
        table.push(self.entry());
    }
}
