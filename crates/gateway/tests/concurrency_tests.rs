// Concurrency tests for completion election: racing gatherers must agree on
// a single winner, whatever the interleaving.

mod common;

use common::{CompletionRecorder, MemoryStore, part_ids, recording_handler, request_id};
use muster_gateway::ScatterGatherGateway;

#[tokio::test(flavor = "multi_thread")]
async fn racing_gatherers_elect_exactly_one_winner() {
    let store = MemoryStore::new();
    let gateway = ScatterGatherGateway::new(store.clone());
    let request = request_id("r");
    let recorder = CompletionRecorder::new();

    gateway.begin_scatter(&request, "ctx").await.unwrap();
    let parts: Vec<String> = (0..16).map(|i| format!("part-{i}")).collect();
    let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    gateway
        .scatter(&request, &part_ids(&part_refs), || async { Ok(()) })
        .await
        .unwrap();
    gateway
        .end_scatter(&request, recording_handler(&recorder))
        .await
        .unwrap();

    // One worker per part, all gathering at once.
    let mut handles = Vec::new();
    for part in &parts {
        let gateway = gateway.clone();
        let request = request.clone();
        let handler = recording_handler(&recorder);
        let part = part.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .gather(&request, &part_ids(&[part.as_str()]), handler)
                .await
                .unwrap()
        }));
    }

    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap().is_completed() {
            completed += 1;
        }
    }

    assert_eq!(completed, 1, "exactly one gatherer must win");
    assert_eq!(recorder.contexts(), vec!["ctx".to_string()]);
    assert_eq!(store.claims_won(), 1);
    assert!(!store.request_exists("r"));
    assert_eq!(store.part_count("r"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn last_two_parts_race_many_rounds() {
    // Repeat the two-way race to cover both interleavings: the loser either
    // still sees the winner's part outstanding or loses the conditional
    // claim. Either way the handler fires once per round.
    for round in 0..50 {
        let store = MemoryStore::new();
        let gateway = ScatterGatherGateway::new(store.clone());
        let request = request_id("r");
        let recorder = CompletionRecorder::new();

        gateway.begin_scatter(&request, "ctx").await.unwrap();
        gateway
            .scatter(&request, &part_ids(&["lorem", "ipsum"]), || async { Ok(()) })
            .await
            .unwrap();
        gateway
            .end_scatter(&request, recording_handler(&recorder))
            .await
            .unwrap();

        let first = {
            let gateway = gateway.clone();
            let request = request.clone();
            let handler = recording_handler(&recorder);
            tokio::spawn(async move {
                gateway
                    .gather(&request, &part_ids(&["lorem"]), handler)
                    .await
                    .unwrap()
            })
        };
        let second = {
            let gateway = gateway.clone();
            let request = request.clone();
            let handler = recording_handler(&recorder);
            tokio::spawn(async move {
                gateway
                    .gather(&request, &part_ids(&["ipsum"]), handler)
                    .await
                    .unwrap()
            })
        };

        let (first, second) = tokio::join!(first, second);
        let winners = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|outcome| outcome.is_completed())
            .count();

        assert_eq!(winners, 1, "round {round}: exactly one winner expected");
        assert_eq!(recorder.count(), 1, "round {round}");
        assert_eq!(store.claims_won(), 1, "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn end_scatter_races_the_final_gather() {
    // Whichever side observes the final empty state completes; the other
    // reports pending. Never zero, never two.
    for round in 0..50 {
        let store = MemoryStore::new();
        let gateway = ScatterGatherGateway::new(store.clone());
        let request = request_id("r");
        let recorder = CompletionRecorder::new();

        gateway.begin_scatter(&request, "ctx").await.unwrap();
        gateway
            .scatter(&request, &part_ids(&["lorem"]), || async { Ok(()) })
            .await
            .unwrap();

        let ender = {
            let gateway = gateway.clone();
            let request = request.clone();
            let handler = recording_handler(&recorder);
            tokio::spawn(
                async move { gateway.end_scatter(&request, handler).await.unwrap() },
            )
        };
        let gatherer = {
            let gateway = gateway.clone();
            let request = request.clone();
            let handler = recording_handler(&recorder);
            tokio::spawn(async move {
                gateway
                    .gather(&request, &part_ids(&["lorem"]), handler)
                    .await
                    .unwrap()
            })
        };

        let (ender, gatherer) = tokio::join!(ender, gatherer);
        let outcomes = [ender.unwrap(), gatherer.unwrap()];
        let winners = outcomes
            .iter()
            .filter(|outcome| outcome.is_completed())
            .count();

        // The gather may run entirely before end_scatter marks the flag; in
        // that interleaving end_scatter itself completes. If the gather runs
        // after, it wins instead.
        assert_eq!(winners, 1, "round {round}: exactly one winner expected");
        assert_eq!(recorder.count(), 1, "round {round}");
        assert!(!store.request_exists("r"), "round {round}");
    }
}
