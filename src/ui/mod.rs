pub mod interrupt;
pub mod plain_renderer;
pub mod progress;
pub mod renderer;
pub mod session;
pub mod theme;
pub mod widgets;

pub use plain_renderer::PlainRenderer;
pub use renderer::{SpinnerHandle, UiError, UiResult};
pub use session::{run_plain_session, PlainSessionError};
pub use theme::OutputMode;
pub use widgets::{KeyValue, NoticeLevel};
