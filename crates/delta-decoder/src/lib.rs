//! Pure decoder for delta batches pushed on the edge delta topic.
//!
//! This crate contains only data types and transforms, with no I/O and no async
//! transport. A batch is parsed into a [`DeltaBatch`], its resume marker is
//! read by the session, and the records are turned into [`MessageEvent`]s.
//!
//! Two seams are injectable: the [`ClientPayloadDecoder`] that unpacks the
//! nested inner payload, and the [`AttachmentNormalizer`] that shapes raw
//! attachments.

mod attachment;
mod decoder;
mod envelope;
mod error;
mod event;

pub use attachment::{AttachmentNormalizer, DefaultAttachmentNormalizer};
pub use decoder::DeltaDecoder;
pub use envelope::{ClientPayload, ClientPayloadDecoder, DeltaBatch, JsonByteArrayDecoder};
pub use error::{DecodeError, DecodeResult};
pub use event::{Attachment, EventKind, MessageEvent, NormalizedAttachment};
