//! Organizer core: domain types, the tab-category index, the lifecycle state
//! machine and pure reconciliation planning.
mod category;
mod effect;
mod index;
mod model;
mod msg;
pub mod plan;
mod state;
mod update;
mod view_model;

pub use category::{Category, EmptyCategory, OTHER, UNCATEGORIZED};
pub use effect::Effect;
pub use index::TabCategoryIndex;
pub use model::{Group, GroupId, Tab, TabId, Window, WindowId, WindowKind};
pub use msg::Msg;
pub use state::{Generation, OrganizerState};
pub use update::update;
pub use view_model::CategoryOverview;
