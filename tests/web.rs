//! 浏览器环境下的 wasm 接口测试。

#![cfg(target_arch = "wasm32")]

use duel_core::{GameEngine, GameState};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn seeded_engine() -> GameEngine {
    GameEngine::new(Some(r#"{"seed": 7}"#.to_string())).expect("engine")
}

#[wasm_bindgen_test]
fn engine_opens_on_first_players_turn() {
    let engine = seeded_engine();
    assert_eq!(engine.active_player(), 0);
    assert_eq!(engine.turn(), 1);
    let state: GameState = serde_json::from_str(&engine.state_json().expect("state")).expect("valid json");
    assert_eq!(state.players[0].max_mana, 1);
}

#[wasm_bindgen_test]
fn end_turn_for_wrong_player_is_rejected() {
    let mut engine = seeded_engine();
    assert!(engine.end_turn(1).is_err());
    assert!(engine.end_turn(0).is_ok());
    assert_eq!(engine.active_player(), 1);
}

#[wasm_bindgen_test]
fn ai_turn_passes_control_back() {
    let mut engine = seeded_engine();
    engine.end_turn(0).expect("end turn");
    engine
        .play_ai_turn(1, Some("hard".into()), None)
        .expect("ai turn");
    assert!(engine.is_finished() || engine.active_player() == 0);
}

#[wasm_bindgen_test]
fn unknown_config_field_is_rejected() {
    assert!(GameEngine::new(Some(r#"{"board": 9}"#.to_string())).is_err());
}

#[wasm_bindgen_test]
fn ai_move_for_unknown_player_is_an_error() {
    let mut engine = seeded_engine();
    assert!(engine.apply_ai_move(7, None, None).is_err());
    assert!(engine.play_ai_turn(2, None, None).is_err());
    assert_eq!(engine.active_player(), 0);
}
