//! Live end-to-end test against the real model and embedding APIs.
//!
//! Ignored by default. Run with:
//! `OPENAI_API_KEY=... cargo test -p gm-core -- --ignored --nocapture`

use gm_core::testing::{sample_cellar, sample_fighter, sample_npc};
use gm_core::world::UserId;
use gm_core::GameService;

fn setup() -> bool {
    let _ = dotenvy::dotenv();
    std::env::var("OPENAI_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_live_turn_produces_grounded_narration() {
    if !setup() {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    }

    let service = GameService::from_env().expect("client from env");
    let owner = UserId::new();
    let campaign = service
        .initialize_game_state(owner, "Live Smoke Test")
        .await
        .expect("campaign");

    service
        .register_character(owner, sample_fighter(campaign.id))
        .await
        .expect("character");
    let location = sample_cellar(campaign.id);
    let location_id = service
        .create_location(owner, location)
        .await
        .expect("location");
    service
        .set_current_location(owner, campaign.id, location_id)
        .await
        .expect("set location");
    service
        .create_npc(owner, sample_npc(campaign.id, Some(location_id)))
        .await
        .expect("npc");

    let response = service
        .interact(
            owner,
            campaign.id,
            "I try to force open the rusted cellar door",
        )
        .await
        .expect("live turn");

    println!("narration: {}", response.narration);
    for result in &response.visible_results {
        println!("mechanics: {}", result.summary);
    }
    assert!(!response.narration.is_empty());
    assert_eq!(response.turn_number, 1);
}
