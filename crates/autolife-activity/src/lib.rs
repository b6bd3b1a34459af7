//! Autolife Activity
//!
//! Turns finished task runs into activity-timeline records. Classification is
//! a keyword match over the task text; titles are fixed templates per category.

mod category;
mod record;

pub use category::{ActivityCategory, analyze_task_category};
pub use record::{
  ActivityMetadata, ActivityRecord, ActivityStatus, NewActivity, activity_from_task,
  extract_activity_description, generate_activity_title, should_create_activity,
};
