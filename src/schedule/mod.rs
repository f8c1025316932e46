//! Client-side schedule editing: the in-memory cache, the optimistic move
//! coordinator, the drag surface and the view that ties them together.

pub mod cache;
pub mod coordinator;
pub mod drag;
pub mod notice;
pub mod view;

pub use cache::{ScheduleCache, SharedCache};
pub use coordinator::{Coordinator, MoveOutcome, PendingMove, RemoveOutcome, SubmitError};
pub use drag::{ActiveDrag, DragSurface, DropResult, MoveIntent};
pub use notice::{Notice, NoticeReceiver, Notifier};
pub use view::{LoadState, ScheduleView};
