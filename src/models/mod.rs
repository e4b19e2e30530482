// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{BattleId, BattleRatings, FetchOutcome, PlayerRating};
pub use requests::BattlesRequest;
pub use responses::{ServiceErrorBody, KEY_NOT_FOUND_EXCEPTION};
