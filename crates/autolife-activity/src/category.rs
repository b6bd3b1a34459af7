use serde::{Deserialize, Serialize};

/// Timeline category of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
  Food,
  Work,
  Life,
  Social,
  Other,
}

impl ActivityCategory {
  /// Categories in match-precedence order. `Other` is the fallback and has no keywords.
  pub const ALL: [ActivityCategory; 5] = [
    ActivityCategory::Food,
    ActivityCategory::Work,
    ActivityCategory::Life,
    ActivityCategory::Social,
    ActivityCategory::Other,
  ];

  pub fn keywords(self) -> &'static [&'static str] {
    match self {
      ActivityCategory::Food => &[
        "外卖", "点餐", "订餐", "奶茶", "咖啡", "饿了么", "美团", "肯德基", "麦当劳", "星巴克",
        "瑞幸", "喜茶", "奈雪", "餐厅", "订单", "下单", "吃", "食物", "饮料",
      ],
      ActivityCategory::Work => &[
        "会议", "邮件", "文档", "日程", "钉钉", "企业微信", "工作", "报告", "审批", "表格",
        "excel", "word", "ppt", "项目", "任务", "同事", "老板",
      ],
      ActivityCategory::Life => &[
        "购物", "音乐", "视频", "游戏", "运动", "健康", "天气", "导航", "支付", "淘宝", "京东",
        "拼多多", "抖音", "快手", "网易云", "qq音乐", "跑步", "健身",
      ],
      ActivityCategory::Social => &[
        "微信", "聊天", "朋友圈", "分享", "发送", "消息", "qq", "微博", "联系人", "好友", "群聊",
        "发朋友圈",
      ],
      ActivityCategory::Other => &[],
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ActivityCategory::Food => "food",
      ActivityCategory::Work => "work",
      ActivityCategory::Life => "life",
      ActivityCategory::Social => "social",
      ActivityCategory::Other => "other",
    }
  }
}

/// Classify a task description. First category with a matching keyword wins.
pub fn analyze_task_category(task: &str) -> ActivityCategory {
  let lowered = task.to_lowercase();

  ActivityCategory::ALL
    .into_iter()
    .find(|category| {
      category
        .keywords()
        .iter()
        .any(|keyword| lowered.contains(keyword))
    })
    .unwrap_or(ActivityCategory::Other)
}
