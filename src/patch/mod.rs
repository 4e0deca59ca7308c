pub mod encode;
pub mod ops;
pub mod session;
pub mod table;

pub use encode::{ControlTransfer, FAR_SEGMENT_SELECTOR, NOP};
pub use ops::{fill_nops, insert_control_transfer};
pub use session::ScopedPatch;
pub use table::{PatchAction, PatchSite, PatchTable};
