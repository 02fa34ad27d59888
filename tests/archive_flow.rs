//! Archive-backed operation flow: hydrate stores, run a checkout, persist,
//! reload — the CLI's lifecycle without the CLI.

mod common;

use cadenza::archive::{ProjectArchive, WorkingState};
use cadenza::config::EngineConfig;
use cadenza::history::HistoryService;
use cadenza::model::HeadPointer;
use cadenza::store::WorkingStore as _;

use common::{diamond, note_vel, pid, region, track, vid};

fn sample_archive() -> ProjectArchive {
    let repo = diamond();
    let mut working = WorkingState::default();
    working.region_tracks.insert(region("r1"), track("t1"));
    working.region_starts.insert(region("r1"), 0.0);
    // Working session matches `left`'s reconstructed state.
    working
        .notes
        .insert(region("r1"), vec![note_vel(60, 0.0, 70)]);

    ProjectArchive {
        project_id: Some(pid()),
        head: Some(HeadPointer {
            variation_id: vid("left"),
            commit_state_id: None,
        }),
        variations: repo.export_variations(&pid()),
        working,
    }
}

#[test]
fn checkout_roundtrips_through_the_archive_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.json");
    sample_archive().store(&path).unwrap();

    // Load, check out `right`, persist.
    let archive = ProjectArchive::load(&path).unwrap();
    let project = archive.project().unwrap();
    let (mut repo, mut working) = archive.into_stores().unwrap();
    let service = HistoryService::new(EngineConfig::default());
    let summary = service
        .checkout(&mut repo, &mut working, &project, &vid("right"), false)
        .unwrap();
    assert_eq!(summary.target_variation_id, vid("right"));
    ProjectArchive::from_stores(&project, &repo, &working)
        .unwrap()
        .store(&path)
        .unwrap();

    // A fresh load sees the moved HEAD and the rewritten working state.
    let reloaded = ProjectArchive::load(&path).unwrap();
    assert_eq!(
        reloaded.head.as_ref().unwrap().variation_id,
        vid("right")
    );
    let (_, working) = reloaded.into_stores().unwrap();
    let notes = working.region_notes(&region("r1")).unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().any(|n| n.pitch == 72));
}

#[test]
fn graph_renders_from_an_archive() {
    let archive = sample_archive();
    let project = archive.project().unwrap();
    let (repo, _) = archive.into_stores().unwrap();

    let g = cadenza::graph::build(&repo, &project).unwrap();
    assert_eq!(g.nodes.len(), 3);
    assert_eq!(g.head, Some(vid("left")));

    let text = cadenza::graph::render_ascii(&g);
    assert!(text.contains("(HEAD)"));
    let json = cadenza::graph::render_json(&g).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
}
