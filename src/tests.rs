use crate::{Counts, ExtensionSets, ExtractionOptions, Extractor, IndexWindow};
use byte_unit::Byte;
use bytes::Bytes;
use itertools::Itertools;
use std::io::{Cursor, Write};
use std::num::NonZeroUsize;
use tar::{Builder, Header};
use tracing::trace;
use tracing_test::traced_test;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

pub(crate) fn make_zip_file(contents: &[(&str, impl AsRef<[u8]>)]) -> Bytes {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut a = zip::write::ZipWriter::new(Cursor::new(vec![]));
    for (name, data) in contents.iter() {
        trace!("adding zip file {:?}", name);
        a.start_file(*name, options).unwrap();
        a.write_all(data.as_ref()).unwrap();
    }
    Bytes::from(a.finish().unwrap().into_inner())
}

pub(crate) fn make_tar_file(contents: &[(&str, impl AsRef<[u8]>)]) -> Bytes {
    let mut a = Builder::new(vec![]);
    for (name, data) in contents.iter() {
        trace!("adding tar file {:?}", name);
        let data = data.as_ref();
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        a.append_data(&mut header, name, data).unwrap();
    }
    Bytes::from(a.into_inner().unwrap())
}

pub(crate) fn gzip(data: impl AsRef<[u8]>) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data.as_ref()).unwrap();
    encoder.finish().unwrap()
}

fn bzip(data: impl AsRef<[u8]>) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), Default::default());
    encoder.write_all(data.as_ref()).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn archive_names(data: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn default_opts() -> ExtractionOptions {
    ExtractionOptions::default()
}

fn window(start: u64, count: Option<u64>) -> ExtractionOptions {
    ExtractionOptions {
        window: IndexWindow::from_start_count(start, count),
        ..default_opts()
    }
}

struct Run {
    counts: Counts,
    counter: u64,
    output: Vec<u8>,
}

impl Run {
    fn names(&self) -> Vec<String> {
        archive_names(&self.output)
    }
}

fn run_with_output(opts: ExtractionOptions, output: Vec<u8>, inputs: &[(&str, Bytes)]) -> Run {
    let mut extractor = Extractor::with_writer(Cursor::new(output), opts).unwrap();
    for (name, data) in inputs {
        extractor.add_buffer(*name, data.clone());
    }
    assert_eq!(extractor.input_file_count(), inputs.len());
    let counts = extractor.extract().unwrap();
    let counter = extractor.counter();
    let output = extractor.finish().unwrap().into_inner();
    Run {
        counts,
        counter,
        output,
    }
}

fn run(opts: ExtractionOptions, inputs: &[(&str, Bytes)]) -> Run {
    run_with_output(opts, vec![], inputs)
}

fn scenario_archive() -> Bytes {
    let inner = make_zip_file(&[("c.jpg", b"jpeg data".as_slice())]);
    make_zip_file(&[
        ("a.png", Bytes::from_static(b"png data")),
        ("b/inner.zip", inner),
        ("readme.txt", Bytes::from_static(b"hello world")),
    ])
}

/// Five images spread across nested zip and tar containers.
fn nested_archive() -> Bytes {
    let tar = make_tar_file(&[("t1.png", b"t1"), ("t2.jpg", b"t2")]);
    let inner = make_zip_file(&[
        ("z1.png", Bytes::from_static(b"z1")),
        ("bundle.tar", tar),
        ("notes.doc", Bytes::from_static(b"doc")),
    ]);
    make_zip_file(&[
        ("first.jpeg", Bytes::from_static(b"first")),
        ("nested/inner.zip", inner),
        ("last.png", Bytes::from_static(b"last")),
    ])
}

#[test]
#[traced_test]
fn test_scenario_nested_zip() {
    let result = run(default_opts(), &[("scenario.zip", scenario_archive())]);
    assert_eq!(
        result.names(),
        ["scenario.zip/a.png", "scenario.zip/b/inner.zip/c.jpg"]
    );
    assert_eq!(result.counter, 2);
    assert_eq!(result.counts.images, 2);
    assert_eq!(result.counts.written, 2);
    assert_eq!(result.counts.skipped, 1);
    assert_eq!(result.counts.containers, 2);
}

#[test]
#[traced_test]
fn test_scenario_window() {
    let result = run(window(1, Some(1)), &[("scenario.zip", scenario_archive())]);
    assert_eq!(result.names(), ["scenario.zip/b/inner.zip/c.jpg"]);
    assert_eq!(result.counter, 2);
    assert_eq!(result.counts.discarded, 1);
    assert_eq!(result.counts.written, 1);
}

#[test]
#[traced_test]
fn test_counter_counts_every_image() {
    let inputs = [("nested.zip", nested_archive())];
    let full = run(default_opts(), &inputs);
    assert_eq!(full.counter, 5);
    assert_eq!(full.counts.images, 5);

    let windowed = run(window(4, None), &inputs);
    assert_eq!(windowed.counter, 5);
    assert_eq!(windowed.counts.written, 1);
    assert_eq!(windowed.counts.discarded, 4);
}

#[test]
#[traced_test]
fn test_window_is_slice_of_full_enumeration() {
    let inputs = [("nested.zip", nested_archive())];
    let full = run(default_opts(), &inputs).names();
    assert_eq!(
        full,
        [
            "nested.zip/first.jpeg",
            "nested.zip/nested/inner.zip/z1.png",
            "nested.zip/nested/inner.zip/bundle.tar/t1.png",
            "nested.zip/nested/inner.zip/bundle.tar/t2.jpg",
            "nested.zip/last.png",
        ]
    );

    for (start, count) in (0..6u64).cartesian_product(1..6u64) {
        let windowed = run(window(start, Some(count)), &inputs).names();
        let end = ((start + count) as usize).min(full.len());
        let start = (start as usize).min(full.len());
        assert_eq!(windowed, full[start..end], "start={start} count={count}");
    }
}

#[test]
#[traced_test]
fn test_runs_are_deterministic() {
    let inputs = [
        ("nested.zip", nested_archive()),
        ("scenario.zip", scenario_archive()),
    ];
    let first = run(window(2, Some(4)), &inputs);
    let second = run(window(2, Some(4)), &inputs);
    assert_eq!(first.names(), second.names());
    assert_eq!(first.output, second.output);
}

#[test]
#[traced_test]
fn test_counter_spans_top_level_inputs() {
    let one = make_zip_file(&[("a.png", b"a"), ("b.png", b"b")]);
    let two = make_zip_file(&[("c.png", b"c"), ("d.png", b"d")]);
    let result = run(window(1, Some(2)), &[("one.zip", one), ("two.zip", two)]);
    assert_eq!(result.names(), ["one.zip/b.png", "two.zip/c.png"]);
    assert_eq!(result.counter, 3);
}

#[test]
#[traced_test]
fn test_halt_stops_every_ancestor() {
    let inner = make_zip_file(&[("a.png", b"a"), ("b.png", b"b"), ("skipped.txt", b"x")]);
    let outer = make_zip_file(&[
        ("inner.zip", inner),
        ("readme.txt", Bytes::from_static(b"never visited")),
        ("c.png", Bytes::from_static(b"c")),
    ]);
    let later = make_zip_file(&[("d.png", b"d")]);
    let result = run(window(0, Some(2)), &[("outer.zip", outer), ("later.zip", later)]);
    assert_eq!(
        result.names(),
        ["outer.zip/inner.zip/a.png", "outer.zip/inner.zip/b.png"]
    );
    assert_eq!(result.counter, 2);
    assert_eq!(result.counts.skipped, 0);
    assert_eq!(result.counts.containers, 2);
}

#[test]
#[traced_test]
fn test_empty_window_reads_nothing() {
    let result = run(window(0, Some(0)), &[("scenario.zip", scenario_archive())]);
    assert!(result.names().is_empty());
    assert_eq!(result.counter, 0);
    assert_eq!(result.counts, Counts::default());
}

#[test]
#[traced_test]
fn test_resume_never_duplicates() {
    let inputs = [("scenario.zip", scenario_archive())];
    let first = run(window(0, Some(1)), &inputs);
    assert_eq!(first.names(), ["scenario.zip/a.png"]);

    let second = run_with_output(default_opts(), first.output, &inputs);
    assert_eq!(
        second.names(),
        ["scenario.zip/a.png", "scenario.zip/b/inner.zip/c.jpg"]
    );
    assert_eq!(second.counts.duplicates, 1);
    assert_eq!(second.counts.written, 1);

    let third = run_with_output(default_opts(), second.output, &inputs);
    assert_eq!(third.names().len(), 2);
    assert_eq!(third.counts.duplicates, 2);
    assert_eq!(third.counts.written, 0);
    assert_eq!(third.counter, 2);
}

#[test]
#[traced_test]
fn test_unknown_entries_are_skipped() {
    let archive = make_zip_file(&[
        ("notes.bin", b"\x00\x01\x02 not a container".as_slice()),
        ("Makefile", b"all:".as_slice()),
        ("dir/", b"".as_slice()),
    ]);
    let result = run(default_opts(), &[("misc.zip", archive)]);
    assert!(result.names().is_empty());
    assert_eq!(result.counter, 0);
    assert_eq!(result.counts.skipped, 3);
    assert_eq!(result.counts.errors, 0);
}

#[test]
#[traced_test]
fn test_top_level_image_and_unknown_input() {
    let result = run(
        default_opts(),
        &[
            ("/photos/cover.PNG", Bytes::from_static(b"png")),
            ("notes.txt", Bytes::from_static(b"text")),
        ],
    );
    assert_eq!(result.names(), ["photos/cover.PNG"]);
    assert_eq!(result.counts.skipped, 1);
}

#[test]
#[traced_test]
fn test_compressed_tars() {
    let tar = make_tar_file(&[("dir/x.png", b"x"), ("y.txt", b"y")]);
    let result = run(
        default_opts(),
        &[
            ("a.tgz", Bytes::from(gzip(&tar))),
            ("b.tar.bz2", Bytes::from(bzip(&tar))),
            ("c.tar", tar.clone()),
        ],
    );
    assert_eq!(
        result.names(),
        ["a.tgz/dir/x.png", "b.tar.bz2/dir/x.png", "c.tar/dir/x.png"]
    );
}

#[test]
#[traced_test]
fn test_sniffs_tar_without_extension() {
    let tar = make_tar_file(&[("x.png", b"x")]);
    let archive = make_zip_file(&[("bundle", tar.clone()), ("bundle.gz", Bytes::from(gzip(&tar)))]);
    let inputs = [("outer.zip", archive)];

    let sniffed = run(default_opts(), &inputs);
    assert_eq!(
        sniffed.names(),
        ["outer.zip/bundle/x.png", "outer.zip/bundle.gz/x.png"]
    );

    let opts = ExtractionOptions {
        sniff_tar: false,
        ..default_opts()
    };
    let named_only = run(opts, &inputs);
    assert!(named_only.names().is_empty());
    assert_eq!(named_only.counts.skipped, 2);
}

#[test]
#[traced_test]
fn test_custom_extensions() {
    let inner = make_zip_file(&[("photo.gif", b"gif")]);
    let archive = make_zip_file(&[("book.epub", inner), ("a.png", Bytes::from_static(b"png"))]);
    let opts = ExtractionOptions {
        extensions: ExtensionSets::new(["zip", "epub"], ["tar"], ["ppt"], ["GIF"]),
        ..default_opts()
    };
    let result = run(opts, &[("outer.zip", archive)]);
    assert_eq!(result.names(), ["outer.zip/book.epub/photo.gif"]);
    assert_eq!(result.counter, 1);
}

#[test]
#[traced_test]
fn test_max_depth() {
    let opts = ExtractionOptions {
        max_depth: NonZeroUsize::new(1),
        ..default_opts()
    };
    let result = run(opts, &[("scenario.zip", scenario_archive())]);
    assert_eq!(result.names(), ["scenario.zip/a.png"]);
    assert_eq!(result.counter, 1);
    assert_eq!(result.counts.skipped, 2);
}

#[test]
#[traced_test]
fn test_corrupt_container_is_skipped() {
    let archive = make_zip_file(&[
        ("broken.zip", b"PK\x03\x04 this is not really a zip".as_slice()),
        ("broken.tar", b"short".as_slice()),
        ("ok.png", b"ok".as_slice()),
    ]);
    let result = run(default_opts(), &[("outer.zip", archive)]);
    assert_eq!(result.names(), ["outer.zip/ok.png"]);
    assert!(result.counts.errors >= 1);
    assert_eq!(result.counter, 1);
}

#[test]
#[traced_test]
fn test_unreadable_image_still_advances_counter() {
    let archive = make_zip_file(&[
        ("big.png", [0u8; 64].as_slice()),
        ("small.png", [0u8; 4].as_slice()),
    ]);
    let opts = ExtractionOptions {
        max_entry_size: Some(Byte::from_u64(16)),
        ..default_opts()
    };
    let result = run(opts, &[("outer.zip", archive)]);
    assert_eq!(result.names(), ["outer.zip/small.png"]);
    assert_eq!(result.counter, 2);
    assert_eq!(result.counts.errors, 1);
}

#[test]
#[traced_test]
fn test_entry_size_limit_ignores_unknown_entries() {
    let inner = make_tar_file(&[("x.png", b"x")]);
    let outer = make_tar_file(&[
        ("video.mp4", Bytes::from(vec![1u8; 64])),
        ("bundle", inner.clone()),
        ("named.tar", inner),
    ]);
    let opts = ExtractionOptions {
        max_entry_size: Some(Byte::from_u64(32)),
        ..default_opts()
    };
    let result = run(opts, &[("outer.tar", outer)]);
    assert_eq!(
        result.names(),
        ["outer.tar/bundle/x.png", "outer.tar/named.tar/x.png"]
    );
    assert_eq!(result.counts.skipped, 1);
    assert_eq!(result.counts.errors, 0);
    assert_eq!(result.counter, 2);
}

#[test]
#[traced_test]
fn test_missing_input_is_fatal() {
    let mut extractor = Extractor::with_writer(Cursor::new(vec![]), default_opts()).unwrap();
    extractor
        .add_path("/nonexistent/archive-to-images/input.zip".into())
        .unwrap();
    let workspace = extractor.workspace().to_path_buf();
    assert!(workspace.exists());
    assert!(matches!(
        extractor.extract(),
        Err(crate::ExtractError::Input(_))
    ));
    drop(extractor);
    assert!(!workspace.exists());
}

#[cfg(unix)]
mod legacy {
    use super::*;
    use crate::CarverCommand;

    fn carving(body: &str) -> ExtractionOptions {
        ExtractionOptions {
            carver: CarverCommand::new("sh", ["-c", body, "carver"]),
            ..default_opts()
        }
    }

    #[test]
    #[traced_test]
    fn test_legacy_fragments_are_walked() {
        let archive = make_zip_file(&[
            ("deck.ppt", b"legacy bytes".as_slice()),
            ("after.png", b"after".as_slice()),
        ]);
        let opts = carving(
            r#"printf one > "$2/file-0001.png"; printf two > "$2/file-0002.jpg"; printf x > "$2/file-0003.txt""#,
        );
        let mut extractor = Extractor::with_writer(Cursor::new(vec![]), opts).unwrap();
        extractor.add_buffer("pack.zip", archive);
        let counts = extractor.extract().unwrap();
        let workspace = extractor.workspace().to_path_buf();
        assert_eq!(std::fs::read_dir(&workspace).unwrap().count(), 0);
        assert_eq!(extractor.counter(), 3);
        let output = extractor.finish().unwrap().into_inner();
        assert!(!workspace.exists());

        assert_eq!(
            archive_names(&output),
            [
                "pack.zip/deck.ppt/file-0001.png",
                "pack.zip/deck.ppt/file-0002.jpg",
                "pack.zip/after.png",
            ]
        );
        assert_eq!(counts.fragments, 3);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    #[traced_test]
    fn test_legacy_window_halts_inside_fragments() {
        let opts = ExtractionOptions {
            window: IndexWindow::from_start_count(1, Some(1)),
            ..carving(r#"for i in 1 2 3; do printf $i > "$2/file-000$i.png"; done"#)
        };
        let result = run(opts, &[("deck.xls", Bytes::from_static(b"legacy"))]);
        assert_eq!(result.names(), ["deck.xls/file-0002.png"]);
        assert_eq!(result.counter, 2);
    }

    #[test]
    #[traced_test]
    fn test_carved_container_is_walked() {
        let embedded = make_zip_file(&[("img.png", b"carved image")]);
        let archive = make_zip_file(&[("deck.ppt", embedded)]);
        let result = run(
            carving(r#"cp "$1" "$2/file-0001.zip""#),
            &[("pack.zip", archive)],
        );
        assert_eq!(result.names(), ["pack.zip/deck.ppt/file-0001.zip/img.png"]);
        assert_eq!(result.counter, 1);
        assert_eq!(result.counts.fragments, 1);
        assert_eq!(result.counts.containers, 3);
    }

    #[test]
    #[traced_test]
    fn test_failing_carver_finds_nothing() {
        let archive = make_zip_file(&[("empty.ppt", b"no images here")]);
        let result = run(carving("exit 1"), &[("pack.zip", archive)]);
        assert!(result.names().is_empty());
        assert_eq!(result.counter, 0);
        assert_eq!(result.counts.fragments, 0);
        assert_eq!(result.counts.errors, 0);
    }
}
