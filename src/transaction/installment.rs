use crate::errors::AppError;
use crate::money::Money;

use super::models::InstallmentPreview;

/// Split of a total value into `count` installments.
///
/// Every installment carries `base` except the last one, which absorbs the
/// rounding remainder so the series adds up to `total` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentPlan {
    pub total: Money,
    pub count: u32,
    pub base: Money,
    pub last: Money,
}

impl InstallmentPlan {
    pub fn new(total: Money, count: u32) -> Result<Self, AppError> {
        if count < 2 {
            return Err(AppError::InvalidOperation(format!(
                "An installment series needs at least 2 installments, got {count}"
            )));
        }

        let base = total.floor_div(count).ok_or_else(|| {
            AppError::InvalidOperation("Installment count cannot be zero".to_string())
        })?;
        if !base.is_positive() {
            return Err(AppError::InvalidOperation(format!(
                "Value {total} cannot be split into {count} installments of at least 0.01"
            )));
        }

        let remainder = total - base.times(count);
        Ok(Self {
            total,
            count,
            base,
            last: base + remainder,
        })
    }

    /// Rebuilds the plan stored on an installment template.
    pub fn from_stored(total: Money, count: u32, base: Money, last: Option<Money>) -> Self {
        let last = last.unwrap_or_else(|| total - base.times(count.saturating_sub(1)));
        Self {
            total,
            count,
            base,
            last,
        }
    }

    /// Amount of the 1-based installment `index`.
    pub fn value_of(&self, index: u32) -> Money {
        if index >= self.count {
            self.last
        } else {
            self.base
        }
    }

    pub fn preview(&self) -> Vec<InstallmentPreview> {
        (1..=self.count)
            .map(|index| InstallmentPreview {
                installment: index as i32,
                value: self.value_of(index),
            })
            .collect()
    }
}
