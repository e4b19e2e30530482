use serde::{Deserialize, Serialize};
use crate::models::domain::BattleId;

/// Body of a ratings lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattlesRequest {
    #[serde(rename = "battleids")]
    pub battle_ids: Vec<BattleId>,
}

impl BattlesRequest {
    pub fn new(battle_ids: &[BattleId]) -> Self {
        Self {
            battle_ids: battle_ids.to_vec(),
        }
    }
}
