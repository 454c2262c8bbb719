//! End-to-end sync runs over in-memory remote services

mod fakes;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

use classroom_sync::app::models::{Attachment, Course, Material, MaterialKind, RecordStatus};
use classroom_sync::app::orchestrator::SyncRequest;
use classroom_sync::app::signals::CancelSignal;
use classroom_sync::app::sync_run::RunStatus;
use classroom_sync::constants::mime;
use classroom_sync::errors::SyncError;

use fakes::{FakeClassroom, FakeHost, Harness};

fn handout(material_id: &str, course_id: &str, file_id: &str, title: &str) -> Material {
    Material::new(material_id, title, MaterialKind::CourseMaterial)
        .in_course(course_id)
        .with_attachment(Attachment::drive(file_id, title, mime::PDF))
}

/// Biology with three distinct PDFs
fn biology() -> (FakeClassroom, FakeHost) {
    let classroom = FakeClassroom::new().course(
        Course::new("bio", "Biology"),
        vec![
            handout("m1", "bio", "f1", "Cells.pdf"),
            handout("m2", "bio", "f2", "Genetics.pdf"),
            handout("m3", "bio", "f3", "Ecology.pdf"),
        ],
    );
    let host = FakeHost::new()
        .file("f1", "Cells.pdf", mime::PDF, b"cells")
        .file("f2", "Genetics.pdf", mime::PDF, b"genetics")
        .file("f3", "Ecology.pdf", mime::PDF, b"ecology");
    (classroom, host)
}

#[tokio::test]
async fn test_sync_places_files_by_course_and_category() {
    let (classroom, host) = biology();
    let harness = Harness::new(classroom, host).await;

    let summary = assert_ok!(harness.orchestrator.run(SyncRequest::all_active()).await);

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.bytes_written, (5 + 8 + 7) as u64);

    let documents = harness.root.join("Biology").join("Documents");
    assert_eq!(
        harness.files_on_disk(),
        vec![
            documents.join("Cells.pdf"),
            documents.join("Ecology.pdf"),
            documents.join("Genetics.pdf"),
        ]
    );
    assert_eq!(
        std::fs::read(documents.join("Genetics.pdf")).unwrap(),
        b"genetics"
    );

    let records = harness.store.all_records().await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == RecordStatus::Stored));
    assert!(records
        .iter()
        .all(|r| r.course_name.as_deref() == Some("Biology")));

    let courses = harness.store.list_courses().await.unwrap();
    assert_eq!(courses.len(), 1);
    assert!(courses[0].last_sync.is_some());
}

/// Test that a repeated sync downloads nothing new
///
/// Every job of the second run lands on a known digest, so the run reports
/// all of them as skipped and the tree is unchanged.
#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let (classroom, host) = biology();
    let harness = Harness::new(classroom, host).await;

    let first = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    let files_after_first = harness.files_on_disk();

    let second = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.total, first.total);
    assert_eq!(second.skipped, second.total);
    assert_eq!(second.completed, 0);
    assert_eq!(second.bytes_written, 0);

    assert_eq!(harness.files_on_disk(), files_after_first);
    assert_eq!(harness.store.all_records().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_restarted_orchestrator_seeds_from_store() {
    let (classroom, host) = biology();
    let harness = Harness::new(classroom, host).await;
    harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    let files_after_first = harness.files_on_disk();

    let (classroom, _) = biology();
    let restarted = harness.restarted(classroom);
    let summary = restarted.run(SyncRequest::all_active()).await.unwrap();

    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.completed, 0);
    assert_eq!(harness.files_on_disk(), files_after_first);
}

/// Test that a deleted canonical file is fetched again
///
/// The next run on the same orchestrator must not treat the digest as known
/// once its file is gone.
#[tokio::test]
async fn test_deleted_file_is_restored_on_next_run() {
    let (classroom, host) = biology();
    let harness = Harness::new(classroom, host).await;
    harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();

    let cells = harness.root.join("Biology").join("Documents").join("Cells.pdf");
    std::fs::remove_file(&cells).unwrap();

    let second = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(std::fs::read(&cells).unwrap(), b"cells");

    let records = harness.store.records_for_material("m1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].local_path, cells);
    assert!(records[0].local_path.exists());
}

/// Test one payload shared by two courses
///
/// The same bytes attached in two courses are written once, under the course
/// whose job registered the digest first; both records point at that file.
#[tokio::test]
async fn test_shared_payload_across_courses_is_stored_once() {
    let classroom = FakeClassroom::new()
        .course(
            Course::new("bio", "Biology"),
            vec![handout("m1", "bio", "fa", "Lab Safety.pdf")],
        )
        .course(
            Course::new("chem", "Chemistry"),
            vec![handout("m2", "chem", "fb", "Safety Rules.pdf")],
        );
    let host = FakeHost::new()
        .file("fa", "Lab Safety.pdf", mime::PDF, b"same payload D")
        .file("fb", "Safety Rules.pdf", mime::PDF, b"same payload D");
    let harness = Harness::new(classroom, host).await;

    let summary = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let files = harness.files_on_disk();
    assert_eq!(files.len(), 1);

    let records = harness.store.all_records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.local_path == files[0]));
    assert_eq!(records[0].digest, records[1].digest);

    let statuses: HashSet<RecordStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        HashSet::from([RecordStatus::Stored, RecordStatus::Deduplicated])
    );

    // Each record keeps its own course, whichever tree holds the bytes
    let courses: HashSet<_> = records.iter().filter_map(|r| r.course_id.clone()).collect();
    assert_eq!(courses, HashSet::from(["bio".to_string(), "chem".to_string()]));
}

#[tokio::test]
async fn test_each_digest_has_one_canonical_path() {
    let classroom = FakeClassroom::new().course(
        Course::new("art", "Art"),
        (0..12)
            .map(|i| handout(&format!("m{}", i), "art", &format!("f{}", i), "Palette.png"))
            .collect(),
    );
    let mut host = FakeHost::new();
    for i in 0..12 {
        // Three distinct payloads spread over twelve attachments
        let payload = format!("payload-{}", i % 3);
        host = host.file(&format!("f{}", i), "Palette.png", "image/png", payload.as_bytes());
    }
    let harness = Harness::with_workers(classroom, host, 6).await;

    let summary = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.skipped, 9);

    let records = harness.store.all_records().await.unwrap();
    let mut paths_by_digest: HashMap<_, HashSet<_>> = HashMap::new();
    for record in &records {
        paths_by_digest
            .entry(record.digest)
            .or_default()
            .insert(record.local_path.clone());
    }
    assert_eq!(paths_by_digest.len(), 3);
    assert!(paths_by_digest.values().all(|paths| paths.len() == 1));
    assert_eq!(harness.files_on_disk().len(), 3);
}

#[tokio::test]
async fn test_same_title_different_content_gets_suffix() {
    let classroom = FakeClassroom::new().course(
        Course::new("math", "Math"),
        vec![
            handout("m1", "math", "f1", "Notes.pdf"),
            handout("m2", "math", "f2", "Notes.pdf"),
            handout("m3", "math", "f3", "Notes.pdf"),
        ],
    );
    let host = FakeHost::new()
        .file("f1", "Notes.pdf", mime::PDF, b"one")
        .file("f2", "Notes.pdf", mime::PDF, b"two")
        .file("f3", "Notes.pdf", mime::PDF, b"three");
    let harness = Harness::new(classroom, host).await;

    harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();

    let names: HashSet<String> = harness
        .files_on_disk()
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    assert_eq!(
        names,
        HashSet::from([
            "Notes.pdf".to_string(),
            "Notes_1.pdf".to_string(),
            "Notes_2.pdf".to_string(),
        ])
    );
}

/// Test that one denied attachment does not affect its siblings
#[tokio::test]
async fn test_permission_denied_fails_only_that_job() {
    let material = Material::new("m1", "Week 3", MaterialKind::Assignment)
        .in_course("bio")
        .with_attachment(Attachment::drive("ok-1", "Reading.pdf", mime::PDF))
        .with_attachment(Attachment::drive("secret", "Answers.pdf", mime::PDF))
        .with_attachment(Attachment::drive("ok-2", "Worksheet.pdf", mime::PDF));
    let classroom = FakeClassroom::new().course(Course::new("bio", "Biology"), vec![material]);
    let host = FakeHost::new()
        .file("ok-1", "Reading.pdf", mime::PDF, b"reading")
        .file("secret", "Answers.pdf", mime::PDF, b"answers")
        .file("ok-2", "Worksheet.pdf", mime::PDF, b"worksheet")
        .denied("secret");
    let harness = Harness::new(classroom, host).await;

    let summary = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].attachment, "Answers.pdf");
    assert_eq!(summary.errors[0].origin, "remote");

    // Denied files are not retried
    assert_eq!(harness.host.calls_for("secret"), 1);

    let records = harness.store.records_for_material("m1").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.attachment_id != "secret"));

    let snapshot = harness.orchestrator.status().await;
    assert!(snapshot.is_complete);
    assert_eq!(snapshot.failed_files, 1);
    assert_eq!(snapshot.errors.len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let classroom = FakeClassroom::new().course(
        Course::new("bio", "Biology"),
        vec![
            handout("m1", "bio", "flaky", "Flaky.pdf"),
            handout("m2", "bio", "broken", "Broken.pdf"),
        ],
    );
    let host = FakeHost::new()
        .file("flaky", "Flaky.pdf", mime::PDF, b"eventually")
        .file("broken", "Broken.pdf", mime::PDF, b"never")
        .flaky("flaky", 2)
        .flaky("broken", 10);
    let harness = Harness::new(classroom, host).await;

    let summary = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed + summary.failed + summary.skipped, summary.total);
    assert_eq!(summary.retries, 4);
    assert_eq!(harness.host.calls_for("flaky"), 3);
    assert_eq!(harness.host.calls_for("broken"), 3);
    assert_eq!(summary.errors[0].attachment, "Broken.pdf");
}

#[tokio::test]
async fn test_material_without_course_is_uncategorized() {
    // Listed under a course but carrying no course id of its own
    let orphan = Material::new("m9", "Club Flyer", MaterialKind::Announcement)
        .with_attachment(Attachment::drive("f9", "Flyer.png", "image/png"));
    let classroom = FakeClassroom::new().course(Course::new("bio", "Biology"), vec![orphan]);
    let host = FakeHost::new().file("f9", "Flyer.png", "image/png", b"png");
    let harness = Harness::new(classroom, host).await;

    harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();

    let expected = harness.root.join("Uncategorized").join("Images").join("Flyer.png");
    assert_eq!(harness.files_on_disk(), vec![expected.clone()]);

    let uncategorized = harness.store.find_uncategorized().await.unwrap();
    assert_eq!(uncategorized.len(), 1);
    assert_eq!(uncategorized[0].local_path, expected);

    let moved = harness
        .store
        .reassign_material_course("m9", "bio")
        .await
        .unwrap();
    assert_eq!(moved, 1);
    assert!(harness.store.find_uncategorized().await.unwrap().is_empty());

    let records = harness.store.records_for_material("m9").await.unwrap();
    assert_eq!(records[0].course_name.as_deref(), Some("Biology"));
    // Files stay where they are
    assert!(expected.exists());
}

#[tokio::test]
async fn test_blank_course_name_is_not_uncategorized() {
    let classroom = FakeClassroom::new().course(
        Course::new("c7", "   "),
        vec![handout("m1", "c7", "f1", "Reading.pdf")],
    );
    let host = FakeHost::new().file("f1", "Reading.pdf", mime::PDF, b"reading");
    let harness = Harness::new(classroom, host).await;

    harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();

    assert_eq!(
        harness.files_on_disk(),
        vec![harness
            .root
            .join("Untitled_Course")
            .join("Documents")
            .join("Reading.pdf")]
    );
    assert!(harness.store.find_uncategorized().await.unwrap().is_empty());
    let records = harness.store.records_for_material("m1").await.unwrap();
    assert_eq!(records[0].course_id.as_deref(), Some("c7"));
}

#[tokio::test]
async fn test_exports_and_shortcuts() {
    let material = Material::new("m1", "Course Outline", MaterialKind::CourseMaterial)
        .in_course("hist")
        .with_attachment(Attachment::drive(
            "doc",
            "Syllabus",
            mime::NATIVE_DOCUMENT,
        ))
        .with_attachment(Attachment::drive(
            "sheet",
            "Grades.gsheet",
            mime::NATIVE_SPREADSHEET,
        ))
        .with_attachment(Attachment::link(
            "https://example.com/timeline",
            Some("Timeline".to_string()),
        ))
        .with_attachment(Attachment::drive("form", "Quiz", mime::NATIVE_FORM));
    let classroom = FakeClassroom::new().course(Course::new("hist", "History"), vec![material]);
    let host = FakeHost::new()
        .file("doc", "Syllabus", mime::NATIVE_DOCUMENT, b"%PDF syllabus")
        .file("sheet", "Grades", mime::NATIVE_SPREADSHEET, b"xlsx grades")
        .file("form", "Quiz", mime::NATIVE_FORM, b"");
    let harness = Harness::new(classroom, host).await;

    let summary = harness.orchestrator.run(SyncRequest::all_active()).await.unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].origin, "unsupported");

    let course = harness.root.join("History");
    let files = harness.files_on_disk();
    assert!(files.contains(&course.join("Documents").join("Syllabus.pdf")));
    assert!(files.contains(&course.join("Spreadsheets").join("Grades.xlsx")));
    assert!(files.contains(&course.join("Documents").join("Timeline.txt")));

    let note = std::fs::read_to_string(course.join("Documents").join("Timeline.txt")).unwrap();
    assert!(note.contains("https://example.com/timeline"));

    // Exports spend one call each; the link and the form spend none
    assert_eq!(harness.host.total_calls(), 2);
}

#[tokio::test]
async fn test_listing_failure_fails_the_run() {
    let (classroom, host) = biology();
    let harness = Harness::new(classroom.failing("bio"), host).await;

    let err = assert_err!(harness.orchestrator.run(SyncRequest::all_active()).await);
    assert!(matches!(err, SyncError::Listing(_)));

    let snapshot = harness.orchestrator.status().await;
    assert_eq!(snapshot.status, Some(RunStatus::Failed));
    assert!(harness.files_on_disk().is_empty());

    let runs = harness.store.recent_sync_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "failed");
}

#[tokio::test]
async fn test_selected_courses_only() {
    let classroom = FakeClassroom::new()
        .course(
            Course::new("bio", "Biology"),
            vec![handout("m1", "bio", "f1", "Cells.pdf")],
        )
        .course(
            Course::new("chem", "Chemistry"),
            vec![handout("m2", "chem", "f2", "Atoms.pdf")],
        );
    let host = FakeHost::new()
        .file("f1", "Cells.pdf", mime::PDF, b"cells")
        .file("f2", "Atoms.pdf", mime::PDF, b"atoms");
    let harness = Harness::new(classroom, host).await;

    let summary = harness
        .orchestrator
        .run(SyncRequest::for_courses(["chem", " chem "]))
        .await
        .unwrap();

    assert_eq!(summary.course_ids, vec!["chem"]);
    assert_eq!(summary.total, 1);
    assert_eq!(
        harness.files_on_disk(),
        vec![harness.root.join("Chemistry").join("Documents").join("Atoms.pdf")]
    );
}

#[tokio::test]
async fn test_second_run_rejected_while_active() {
    let hold = Arc::new(Semaphore::new(0));
    let (classroom, host) = biology();
    let harness = Harness::new(classroom, host.held_by(hold.clone())).await;

    let background = harness.orchestrator.spawn(SyncRequest::all_active());
    let snapshot = harness.wait_until_running().await;
    assert!(snapshot.is_active);

    let err = assert_err!(harness.orchestrator.run(SyncRequest::all_active()).await);
    assert!(matches!(err, SyncError::AlreadyActive { .. }));

    hold.add_permits(100);
    let summary = background.await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 3);

    // A finished run no longer blocks the next one
    assert_ok!(harness.orchestrator.run(SyncRequest::all_active()).await);
}

/// Test cancellation mid-run
///
/// Jobs already transferring finish their transfer but are abandoned before
/// placement; nothing further is dequeued and the summary accounts for every
/// job that never finished.
#[tokio::test]
async fn test_cancel_stops_the_run() {
    let hold = Arc::new(Semaphore::new(0));
    let classroom = FakeClassroom::new().course(
        Course::new("bio", "Biology"),
        (0..10)
            .map(|i| handout(&format!("m{}", i), "bio", &format!("f{}", i), "Slides.pdf"))
            .collect(),
    );
    let mut host = FakeHost::new().held_by(hold.clone());
    for i in 0..10 {
        host = host.file(&format!("f{}", i), "Slides.pdf", mime::PDF, format!("{}", i).as_bytes());
    }
    let harness = Harness::with_workers(classroom, host, 2).await;

    let cancel = CancelSignal::new();
    let orchestrator = harness.orchestrator.clone();
    let run_cancel = cancel.clone();
    let background = tokio::spawn(async move {
        orchestrator
            .run_with_cancel(SyncRequest::all_active(), run_cancel)
            .await
    });

    harness.wait_until_running().await;
    harness.orchestrator.cancel().await;
    assert!(cancel.is_cancelled());
    hold.add_permits(100);

    let summary = background.await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.total, 10);
    assert!(summary.abandoned() >= 8);
    assert!(harness.host.total_calls() <= 2);

    let recorded = harness.store.all_records().await.unwrap().len() as u64;
    assert_eq!(recorded, summary.completed + summary.skipped);
    assert_eq!(harness.files_on_disk().len() as u64, summary.completed);

    let runs = harness.store.recent_sync_runs(1).await.unwrap();
    assert_eq!(runs[0].status, "cancelled");
}
