//! 终端交互：启动时的角色选择与周期间的倒计时

pub mod countdown;
pub mod select;

pub use countdown::{format_remaining, Countdown, CountdownFormat};
pub use select::{ConsoleSelector, FixedSelector, PersonaSelector};
