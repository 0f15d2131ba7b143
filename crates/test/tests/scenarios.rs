use std::fs;

use pageturner_application::{
    AppContext, Command, Flow, NavigationEngine, Piece, TurnOutcome, Viewport,
};
use pageturner_core::{
    Annotation, BookmarkSlot, Error, FontSpec, PieceParams, Settings, ViewMode,
};
use pageturner_engine::{
    HeaderGeometry, PageNamer, ProtocolEvent, ScanAcquisitionProtocol, ScanConfig, ScanState,
};
use pageturner_storage::{
    Storage, StartupRecord, decode_annotations, encode_annotations, list_pages,
};
use pageturner_test::{FixedGeometry, ScriptedScanner, make_settings, piece_dir, write_page};

#[test]
fn new_piece_lists_images_only() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = piece_dir(root.path(), "Gymnopedie", &["Page01.gif", "Page02.gif", "notes.txt"])?;

    assert_eq!(list_pages(&dir)?, vec!["Page01.gif", "Page02.gif"]);
    let piece = Piece::open(&dir, PieceParams::default())?;
    assert_eq!(piece.len(), 2);
    assert_eq!(piece.current_index(), 0);
    Ok(())
}

#[test]
fn scanner_builds_a_piece_page_by_page() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = root.path().join("Scanned");
    fs::create_dir_all(&dir)?;
    let scanner = ScriptedScanner::new();
    let mut scan = ScanAcquisitionProtocol::new(scanner.runtime(), ScanConfig::new(&dir));

    assert!(scan.open_source()?);
    let mut written = Vec::new();
    for _ in 0..2 {
        assert!(scan.request_acquire()?);
        scanner.notify_ready();
        for event in scan.pump() {
            match event {
                ProtocolEvent::PageAcquired { path, .. } => written.push(path),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
    assert_eq!(written, vec![dir.join("Page01.gif"), dir.join("Page02.gif")]);
    assert_eq!(scan.pages_written(), 2);
    assert_eq!(scanner.transfers(), 2);
    assert_eq!(scan.next_page_path(), dir.join(PageNamer::page_name(3, ".gif")));

    let mut nav = NavigationEngine::new(
        Box::new(HeaderGeometry::new()),
        ViewMode::FitWidth,
        Viewport::new(170.0, 100.0),
    );
    let mut ctx = AppContext::new(Settings::default());
    ctx.load_piece(&dir, &mut nav)?;
    assert_eq!(ctx.piece.as_ref().map(Piece::len), Some(2));
    // 17x22 scaled to 170 wide is 220 tall.
    assert_eq!(nav.layout()[0].height, 220.0);

    scan.terminate();
    assert_eq!(scan.state(), ScanState::Closed);
    assert_eq!(scanner.destroyed(), 2);
    Ok(())
}

#[test]
fn failed_transfer_can_be_retried() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let scanner = ScriptedScanner::new();
    scanner.fail_next_transfers(1);
    let mut scan = ScanAcquisitionProtocol::new(scanner.runtime(), ScanConfig::new(root.path()));
    scan.open_source()?;
    scan.request_acquire()?;
    scanner.notify_ready();

    assert!(matches!(
        scan.pump().as_slice(),
        [ProtocolEvent::TransferFailed(_)]
    ));
    assert_eq!(scan.state(), ScanState::AcquirePending);
    assert!(matches!(
        scan.retry_transfer(),
        Some(ProtocolEvent::PageAcquired { page: 1, .. })
    ));
    assert!(root.path().join("Page01.gif").is_file());
    Ok(())
}

#[test]
fn bookmarks_set_recall_and_report_unset() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = piece_dir(root.path(), "Partita", &["p1.png", "p2.png", "p3.png", "p4.png"])?;
    let mut nav = NavigationEngine::new(
        Box::new(FixedGeometry::uniform(600, 800)),
        ViewMode::TwoPage,
        Viewport::new(1200.0, 800.0),
    );
    let mut ctx = AppContext::new(Settings::default());
    ctx.load_piece(&dir, &mut nav)?;

    ctx.apply(Command::Forward, &mut nav);
    ctx.apply(Command::Forward, &mut nav);
    ctx.apply(Command::SetBookmark(BookmarkSlot::new(1).unwrap()), &mut nav);
    ctx.apply(Command::GoToStart, &mut nav);
    assert_eq!(ctx.piece.as_ref().map(Piece::current_index), Some(0));

    ctx.apply(Command::GoToBookmark(BookmarkSlot::new(1).unwrap()), &mut nav);
    assert_eq!(ctx.piece.as_ref().map(Piece::current_index), Some(2));
    ctx.take_message();
    ctx.apply(Command::GoToBookmark(BookmarkSlot::new(2).unwrap()), &mut nav);
    assert_eq!(ctx.take_message().as_deref(), Some("Bookmark 2 Not Set"));
    assert_eq!(ctx.piece.as_ref().map(Piece::current_index), Some(2));
    Ok(())
}

#[test]
fn annotation_records_roundtrip_through_files() -> anyhow::Result<()> {
    assert_eq!(encode_annotations(&[]), "0\n");
    assert!(decode_annotations("0")?.is_empty());

    let font = FontSpec {
        point_size: 18,
        face_name: "Times New Roman".to_string(),
        ..FontSpec::default()
    };
    let set = vec![
        Annotation::new(10, 20, "p", font.clone(), ViewMode::TwoPage),
        Annotation::new(-5, 900, "molto rit.\n", font, ViewMode::FitWidth),
    ];
    assert_eq!(decode_annotations(&encode_annotations(&set))?, set);
    assert_eq!(set[1].text, "molto rit.");

    assert!(matches!(
        decode_annotations("2\n1\n2\n"),
        Err(Error::MalformedRecord(_))
    ));
    Ok(())
}

#[test]
fn fit_width_walks_real_images_without_jumps() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = root.path().join("Prelude");
    fs::create_dir_all(&dir)?;
    write_page(&dir, "Page01.png", 100, 150)?;
    write_page(&dir, "Page02.png", 100, 130)?;
    write_page(&dir, "Page03.png", 100, 140)?;

    let mut nav = NavigationEngine::new(
        Box::new(HeaderGeometry::new()),
        ViewMode::FitWidth,
        Viewport::new(300.0, 200.0),
    );
    let mut ctx = AppContext::new(make_settings(ViewMode::FitWidth, 90.0));
    ctx.load_piece(&dir, &mut nav)?;
    assert_eq!(nav.layout()[0].height, 450.0);

    let mut advanced = 0;
    for _ in 0..40 {
        let before = nav.layout();
        let outcome = nav.turn_forward(ctx.piece.as_mut());
        let after = nav.layout();
        match outcome {
            TurnOutcome::Scrolled => {
                assert!((before[0].y - after[0].y - 90.0).abs() < 1e-9)
            }
            TurnOutcome::Advanced => {
                advanced += 1;
                // The page that moved up into slot 0 keeps scrolling smoothly.
                assert!((before[1].y - 90.0 - after[0].y).abs() < 1e-9);
            }
            TurnOutcome::NoAdvance => break,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(advanced, 2);
    assert_eq!(ctx.piece.as_ref().map(Piece::current_index), Some(2));
    Ok(())
}

#[test]
fn session_state_survives_restart() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = piece_dir(root.path(), "Ballade", &["1.gif", "2.gif", "3.gif"])?;
    let db = root.path().join("pageturner.db");
    let startup_path = root.path().join("startup.txt");

    {
        let mut nav = NavigationEngine::new(
            Box::new(FixedGeometry::uniform(612, 792)),
            ViewMode::TwoPage,
            Viewport::new(1224.0, 792.0),
        );
        let mut ctx = AppContext::new(Settings::default()).with_store(Box::new(Storage::open(&db)?));
        ctx.load_piece(&dir, &mut nav)?;
        ctx.apply(Command::Forward, &mut nav);
        ctx.apply(Command::SlowDown, &mut nav);
        ctx.apply(Command::ToggleViewMode, &mut nav);
        assert_eq!(ctx.apply(Command::Quit, &mut nav), Flow::Quit);
        ctx.startup.save(&startup_path)?;
    }

    let mut nav = NavigationEngine::new(
        Box::new(FixedGeometry::uniform(612, 792)),
        ViewMode::TwoPage,
        Viewport::new(1224.0, 792.0),
    );
    let mut ctx = AppContext::new(Settings::default())
        .with_store(Box::new(Storage::open(&db)?))
        .with_startup(StartupRecord::load(&startup_path)?);
    assert!(ctx.resume(&mut nav)?);
    let piece = ctx.piece.as_ref().expect("resumed piece");
    assert_eq!(piece.current_index(), 1);
    assert!((piece.params().timer_value - 5.5).abs() < 1e-9);
    assert_eq!(nav.view_mode(), ViewMode::FitWidth);
    Ok(())
}

#[test]
fn rescanned_page_is_measured_again() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let dir = root.path().join("Rescan");
    fs::create_dir_all(&dir)?;
    let page = write_page(&dir, "Page01.png", 100, 150)?;

    let mut nav = NavigationEngine::new(
        Box::new(HeaderGeometry::new()),
        ViewMode::FitWidth,
        Viewport::new(200.0, 100.0),
    );
    let mut ctx = AppContext::new(Settings::default());
    ctx.load_piece(&dir, &mut nav)?;
    assert_eq!(nav.layout()[0].height, 300.0);

    write_page(&dir, "Page01.png", 100, 120)?;
    ctx.load_piece(&dir, &mut nav)?;
    assert_eq!(nav.layout()[0].height, 300.0);
    nav.forget_page(&page);
    ctx.load_piece(&dir, &mut nav)?;
    assert_eq!(nav.layout()[0].height, 240.0);
    Ok(())
}

#[test]
fn failed_transfer_waits_for_the_performer() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let scanner = ScriptedScanner::new();
    scanner.fail_next_transfers(1);
    let mut scan = ScanAcquisitionProtocol::new(scanner.runtime(), ScanConfig::new(root.path()));
    scan.open_source()?;
    scan.request_acquire()?;
    scanner.notify_ready();
    assert!(matches!(scan.pump().as_slice(), [ProtocolEvent::TransferFailed(_)]));

    scanner.notify_ready();
    assert!(scan.pump().is_empty());
    assert_eq!(scanner.transfers(), 0);
    assert_eq!(Command::parse_line(":retry-scan"), Some(Command::RetryScan));
    assert!(matches!(
        scan.retry_transfer(),
        Some(ProtocolEvent::PageAcquired { page: 1, .. })
    ));
    assert_eq!(scanner.acquires(), 1);
    Ok(())
}
