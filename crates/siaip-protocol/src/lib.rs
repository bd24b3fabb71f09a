pub mod cipher;
pub mod codec;
pub mod crc;
pub mod decoder;
pub mod frame;
pub mod panel;
pub mod processor;
pub mod timestamp;

pub use cipher::{CipherKind, decrypt_hex, encrypt_hex};
pub use codec::SiaCodec;
pub use decoder::MessageDecoder;
pub use frame::{IdBlock, InboundFrame, ResponseFrame, build_frame};
pub use panel::PanelFrame;
pub use processor::{FrameProcessor, Processed};
pub use timestamp::{LocalZone, TimestampReconciler};
