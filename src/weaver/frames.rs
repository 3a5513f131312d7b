//! Stack map maintenance for woven bodies.
//!
//! Every original frame is moved to its instruction's new offset and extended with the context
//! handle: the locals are padded with `Top` up to the original `max_locals`, so the handle
//! always sits in the slot the prologue stored it to, and `Uninitialized` entries follow their
//! `new` instruction. One extra frame describes the exceptional-exit handler.

use crate::{
    classfile::{
        stackmap::{decode_frames, encode_full_frames},
        StackMapFrame, VerificationType,
    },
    Result,
};

/// Inputs the frame rewrite needs besides the original table.
#[derive(Debug, Clone)]
pub struct FrameLayout<'a> {
    /// Locals of the implicit entry frame
    pub initial: &'a [VerificationType],
    /// `max_locals` of the original body, i.e. the handle's slot
    pub context_slot: u16,
    /// Type of the context handle
    pub context: VerificationType,
    /// Type on the handler's stack
    pub throwable: VerificationType,
    /// Offset of the exceptional-exit handler in the new code
    pub handler: u16,
}

/// Rewrite a `StackMapTable` payload (or create one when `original` is `None`).
///
/// `remap` translates an original instruction offset into its new offset.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a frame declares more local slots than the original
/// body has, or an offset cannot be remapped.
pub fn rewrite_stack_map<F>(
    original: Option<&[u8]>,
    layout: &FrameLayout<'_>,
    remap: F,
) -> Result<Vec<u8>>
where
    F: Fn(u16) -> Result<u16>,
{
    let frames = match original {
        Some(info) => decode_frames(info, layout.initial)?,
        None => Vec::new(),
    };

    let mut rewritten = Vec::with_capacity(frames.len() + 1);
    for frame in frames {
        let slots = frame.local_slots();
        if slots > layout.context_slot {
            return Err(malformed_error!(
                "Frame at {} covers {} locals, body declares {}",
                frame.offset,
                slots,
                layout.context_slot
            ));
        }

        let mut locals = frame
            .locals
            .iter()
            .map(|local| relocate(*local, &remap))
            .collect::<Result<Vec<_>>>()?;
        let padding = usize::from(layout.context_slot - slots);
        locals.extend(std::iter::repeat_n(VerificationType::Top, padding));
        locals.push(layout.context);

        rewritten.push(StackMapFrame {
            offset: remap(frame.offset)?,
            locals,
            stack: frame
                .stack
                .iter()
                .map(|entry| relocate(*entry, &remap))
                .collect::<Result<Vec<_>>>()?,
        });
    }

    let mut handler_locals = vec![VerificationType::Top; usize::from(layout.context_slot)];
    handler_locals.push(layout.context);
    rewritten.push(StackMapFrame {
        offset: layout.handler,
        locals: handler_locals,
        stack: vec![layout.throwable],
    });

    encode_full_frames(&rewritten)
}

fn relocate<F>(entry: VerificationType, remap: &F) -> Result<VerificationType>
where
    F: Fn(u16) -> Result<u16>,
{
    Ok(match entry {
        VerificationType::Uninitialized(offset) => VerificationType::Uninitialized(remap(offset)?),
        other => other,
    })
}
