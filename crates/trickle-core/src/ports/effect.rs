//! TargetEffect port - target に適用する副作用（例: tooltip の bind）
//!
//! bind は常に unbind の後に呼ばれるので、実装は冪等である必要があります。

use crate::domain::{BindOptions, EffectError, Target};

pub trait TargetEffect: Send + Sync + 'static {
    fn bind(&self, target: &Target, options: &BindOptions) -> Result<(), EffectError>;

    fn unbind(&self, target: &Target) -> Result<(), EffectError>;

    fn is_bound(&self, target: &Target) -> bool;
}
