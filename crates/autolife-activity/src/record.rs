use autolife_task::{TaskExecution, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{ActivityCategory, analyze_task_category};

/// Outcome recorded on an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
  Completed,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityMetadata {
  /// Number of steps the run took.
  pub steps: usize,
}

/// An activity ready to be appended to the log (no id or timestamp yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
  pub title: String,
  pub description: String,
  pub category: ActivityCategory,
  pub status: ActivityStatus,
  pub task_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<u64>,
  pub metadata: ActivityMetadata,
}

impl NewActivity {
  /// Assign an id and timestamp.
  pub fn into_record(self) -> ActivityRecord {
    ActivityRecord {
      id: uuid::Uuid::new_v4().to_string(),
      title: self.title,
      description: self.description,
      category: self.category,
      status: self.status,
      task_id: self.task_id,
      duration: self.duration,
      metadata: self.metadata,
      timestamp: Utc::now(),
    }
  }
}

/// An entry of the activity timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
  pub id: String,
  pub title: String,
  pub description: String,
  pub category: ActivityCategory,
  pub status: ActivityStatus,
  pub task_id: String,
  /// Run duration in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<u64>,
  pub metadata: ActivityMetadata,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

/// Only successful runs with at least one step and a recognized category
/// become activities.
pub fn should_create_activity(task: &TaskExecution) -> bool {
  task.status == TaskStatus::Completed
    && !task.steps.is_empty()
    && analyze_task_category(&task.task) != ActivityCategory::Other
}

/// Title for the activity derived from a run.
pub fn generate_activity_title(task: &TaskExecution) -> String {
  let text = task.task.to_lowercase();
  let has = |keyword: &str| text.contains(keyword);

  let title = match analyze_task_category(&task.task) {
    ActivityCategory::Food => {
      if has("外卖") {
        "点了外卖"
      } else if has("奶茶") {
        "订了奶茶"
      } else if has("咖啡") {
        "订了咖啡"
      } else if has("点餐") || has("订餐") {
        "订购了美食"
      } else {
        "完成了饮食任务"
      }
    }
    ActivityCategory::Work => {
      if has("会议") {
        "安排了会议"
      } else if has("邮件") {
        "发送了邮件"
      } else if has("文档") {
        "处理了文档"
      } else if has("日程") {
        "管理了日程"
      } else {
        "处理了工作事项"
      }
    }
    ActivityCategory::Life => {
      if has("购物") {
        "完成了购物"
      } else if has("音乐") {
        "播放了音乐"
      } else if has("视频") {
        "观看了视频"
      } else if has("运动") || has("健身") {
        "完成了运动"
      } else {
        "完成了生活任务"
      }
    }
    ActivityCategory::Social => {
      if has("微信") {
        "发送了微信消息"
      } else if has("朋友圈") {
        "发布了朋友圈"
      } else if has("分享") {
        "分享了内容"
      } else {
        "进行了社交活动"
      }
    }
    ActivityCategory::Other => "完成了任务",
  };

  title.to_string()
}

/// Description for the activity: the task text itself.
pub fn extract_activity_description(task: &TaskExecution) -> String {
  task.task.clone()
}

/// Build the activity for a finished run.
pub fn activity_from_task(task: &TaskExecution) -> NewActivity {
  let status = if task.status == TaskStatus::Completed {
    ActivityStatus::Completed
  } else {
    ActivityStatus::Failed
  };

  NewActivity {
    title: generate_activity_title(task),
    description: extract_activity_description(task),
    category: analyze_task_category(&task.task),
    status,
    task_id: task.task_id.clone(),
    duration: task.duration_ms(),
    metadata: ActivityMetadata {
      steps: task.steps.len(),
    },
  }
}
