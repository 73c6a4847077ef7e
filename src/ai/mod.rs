mod classifier;

pub use classifier::{AchievementClassifier, Classification, Classifier};
