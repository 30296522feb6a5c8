// 进度值对象

use serde::{Deserialize, Serialize};
use std::fmt;

/// 字节进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 已传输字节数
    pub loaded: u64,
    /// 总字节数
    pub total: u64,
}

impl Progress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }

    /// 完成比例，total 为 0 时返回 0
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.loaded as f64 / self.total as f64
    }

    /// 四舍五入的百分比
    pub fn percent(&self) -> u32 {
        (self.value() * 100.0).round() as u32
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

const SCALES: [&str; 4] = ["B", "KB", "MB", "GB"];

/// 格式化字节大小（1000 进制，保留三位有效数字）
///
/// 例如 `1_500_000` -> `"1.5 MB"`
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut index = 0;

    while value > 999.0 && index < SCALES.len() - 1 {
        value /= 1000.0;
        index += 1;
    }

    format!("{} {}", three_significant_digits(value), SCALES[index])
}

fn three_significant_digits(value: f64) -> f64 {
    if value >= 100.0 {
        value.floor()
    } else if value >= 10.0 {
        (value * 10.0).round() / 10.0
    } else {
        (value * 100.0).round() / 100.0
    }
}
