mod achievement;
mod game;
mod guide;
mod score;
mod timing;

pub use achievement::{Achievement, AchievementUpdate, NewAchievement};
pub use game::{Game, GameUpdate, NewGame};
pub use guide::{Guide, GuideKind, GuideUpdate, NewGuide, ParsedGuideContent};
pub use score::{EngagementScore, NewEngagementScore};
pub use timing::{HltbTime, HltbTimeUpdate, NewHltbTime};
