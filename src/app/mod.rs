pub mod payload;
pub mod ports;
pub mod send_use_case;

pub use payload::{build_payload, entry_id_for, TargetEntry, TargetPayload};
pub use ports::TargetCmsPort;
pub use send_use_case::{BatchSummary, Operation, SendReport, SendSettings, SendUseCase};
