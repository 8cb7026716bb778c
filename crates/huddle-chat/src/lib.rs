// Chat timeline, receiver and file transfer state for one meeting session.

pub mod bus;
pub mod config;
pub mod events;
pub mod matcher;
pub mod receivers;
pub mod scroll;
pub mod session;
pub mod timeline;
pub mod transfers;
pub mod transport;
pub mod validation;

pub use bus::{EventBus, Subscription};
pub use config::ChatConfig;
pub use events::{ChatSnapshot, ChatUpdate, Notice, NoticeLevel};
pub use matcher::{is_same_transfer, TransferIdentity, TransferKey};
pub use receivers::{receiver_options, resolve_receiver};
pub use scroll::{ScrollDecision, ScrollMetrics, TimelineViewport};
pub use session::ChatSession;
pub use timeline::{ChatStore, NewMessageToast, PendingSend};
pub use transfers::{CancelOutcome, PendingFileTransfer, RetryCandidate, TransferTracker};
pub use transport::{CancelHandle, ChatTransport, LoopbackTransport, UploadTicket};
pub use validation::validate_file;
