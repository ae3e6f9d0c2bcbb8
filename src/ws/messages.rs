//! Wire protocol. Event names and payload fields are part of the client
//! contract; the tagged enums here pin both.

use crate::engine::{PrivateCards, TableEvent, TableSnapshot};
use serde::{Deserialize, Serialize};

/// What a raise/bet/call/check/fold request names. `RAISE` carries its
/// target in the sibling `amount` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "table:join")]
    #[serde(rename_all = "camelCase")]
    Join { table_id: String },

    #[serde(rename = "table:sit")]
    #[serde(rename_all = "camelCase")]
    Sit {
        table_id: String,
        seat_no: usize,
        buy_in_amount: i64,
    },

    #[serde(rename = "table:leave")]
    #[serde(rename_all = "camelCase")]
    Leave { table_id: String },

    #[serde(rename = "table:rebuy")]
    #[serde(rename_all = "camelCase")]
    Rebuy { table_id: String, amount: i64 },

    #[serde(rename = "table:sit_out")]
    #[serde(rename_all = "camelCase")]
    SitOut { table_id: String },

    #[serde(rename = "table:sit_in")]
    #[serde(rename_all = "camelCase")]
    SitIn { table_id: String },

    #[serde(rename = "table:action")]
    #[serde(rename_all = "camelCase")]
    Action {
        table_id: String,
        action: ActionKind,
        #[serde(default)]
        amount: Option<i64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Full snapshot, sent directly on join.
    #[serde(rename = "table:state")]
    State(TableSnapshot),

    /// Room-fanned lifecycle events and snapshots.
    #[serde(rename = "table:event")]
    Event(TableEvent),

    /// Hole cards; only ever sent to the owner's private room.
    #[serde(rename = "table:private_cards")]
    PrivateCards(PrivateCards),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_action_payload_shape() {
        let json = r#"{"type":"table:action","payload":{"tableId":"t1","action":"RAISE","amount":60}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Action {
                table_id,
                action,
                amount,
            } => {
                assert_eq!(table_id, "t1");
                assert_eq!(action, ActionKind::Raise);
                assert_eq!(amount, Some(60));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_client_action_amount_is_optional() {
        let json = r#"{"type":"table:action","payload":{"tableId":"t1","action":"FOLD"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Action {
                action: ActionKind::Fold,
                amount: None,
                ..
            }
        ));
    }

    #[test]
    fn test_sit_payload_shape() {
        let json =
            r#"{"type":"table:sit","payload":{"tableId":"t1","seatNo":3,"buyInAmount":500}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Sit {
                seat_no: 3,
                buy_in_amount: 500,
                ..
            }
        ));
    }

    #[test]
    fn test_private_cards_event_name() {
        use crate::game::deck::Card;
        let msg = ServerMessage::PrivateCards(PrivateCards {
            table_id: "t1".to_string(),
            hand_id: "h1".to_string(),
            cards: [Card::new(14, 0), Card::new(13, 0)],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"table:private_cards\""));
        assert!(json.contains("\"handId\":\"h1\""));
    }
}
