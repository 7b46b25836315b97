use avbag_core::bag::{update_manifests, BagInfo, DigestAlgorithm, Manifest, ManifestKind};
use avbag_core::fsutil::copy_dir_recursive;
use avbag_core::listing::FilesXml;
use avbag_core::{
    verify_bag, AvBagError, ConversionTally, Converter, ConverterConfig, FixedClock,
    SequentialIds, SourceCatalog, SourcesConfig,
};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

const BAG_PARENT: &str = "7bf09491-54b4-436e-7f59-1027f54cbb0c";
const BAG: &str = "a9e5b1a4-5e43-4b1c-9d4f-23a8a2f6f6a1";
const ARCHIVE_CONTENT: &[u8] = b"0123456789";
const STREAMING_CONTENT: &[u8] = b"streaming copy";

const REV2_PARENT: &str = "00000000-0000-4000-8000-000000000001";
const REV2_BAG: &str = "00000000-0000-4000-8000-000000000002";
const REV3_PARENT: &str = "00000000-0000-4000-8000-000000000003";
const REV3_BAG: &str = "00000000-0000-4000-8000-000000000004";

const DATASET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ddm:DDM xmlns:ddm="http://easy.dans.knaw.nl/schemas/md/ddm/"
         xmlns:dct="http://purl.org/dc/terms/"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xmlns:id-type="http://easy.dans.knaw.nl/schemas/vocab/identifier-type/">
    <ddm:dcmiMetadata>
        <dct:identifier xsi:type="id-type:DOI">10.17026/dans-xyz-abcd</dct:identifier>
        <dct:identifier xsi:type="id-type:URN">urn:nbn:nl:ui:13-xyz</dct:identifier>
    </ddm:dcmiMetadata>
</ddm:DDM>
"#;

struct Fixture {
    dir: TempDir,
    sources: SourcesConfig,
}

struct FixtureOptions {
    visible_rights: bool,
    streaming: bool,
    archive_id: &'static str,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            visible_rights: true,
            streaming: true,
            archive_id: "easy-file:1",
        }
    }
}

fn files_xml(visible_rights: bool) -> String {
    let visible = if visible_rights {
        "\n        <visibleToRights>ANONYMOUS</visibleToRights>"
    } else {
        ""
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<files xmlns="http://easy.dans.knaw.nl/schemas/bag/metadata/files/" xmlns:dct="http://purl.org/dc/terms/">
    <file filepath="data/video/interview.mp4">
        <dct:identifier>easy-file:1</dct:identifier>
        <dct:source>http://legacy-storage.dans.knaw.nl/data/interview.mp4</dct:source>
        <accessibleToRights>ANONYMOUS</accessibleToRights>{visible}
    </file>
    <file filepath="data/secret.txt">
        <dct:identifier>easy-file:2</dct:identifier>
        <accessibleToRights>NONE</accessibleToRights>
    </file>
    <file filepath="data/public.txt">
        <dct:identifier>easy-file:3</dct:identifier>
        <accessibleToRights>ANONYMOUS</accessibleToRights>
        <visibleToRights>NONE</visibleToRights>
    </file>
</files>
"#
    )
}

impl Fixture {
    fn new(options: FixtureOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for d in ["input", "output", "staging", "av", "springfield"] {
            fs::create_dir_all(root.join(d)).unwrap();
        }

        let bag = root.join("input").join(BAG_PARENT).join(BAG);
        fs::create_dir_all(bag.join("data/video")).unwrap();
        fs::create_dir_all(bag.join("metadata")).unwrap();
        fs::write(
            bag.join("bagit.txt"),
            "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n",
        )
        .unwrap();
        fs::write(
            bag.join("bag-info.txt"),
            "Bagging-Date: 2016-06-07\nPayload-Oxum: 0.0\n",
        )
        .unwrap();
        fs::write(bag.join("data/video/interview.mp4"), b"").unwrap();
        fs::write(bag.join("data/secret.txt"), b"nobody sees this").unwrap();
        fs::write(bag.join("data/public.txt"), b"everybody sees this").unwrap();
        fs::write(bag.join("metadata/files.xml"), files_xml(options.visible_rights)).unwrap();
        fs::write(bag.join("metadata/dataset.xml"), DATASET).unwrap();
        fs::write(bag.join("manifest-sha1.txt"), "").unwrap();
        fs::write(bag.join("tagmanifest-sha1.txt"), "").unwrap();
        update_manifests(&bag).unwrap();

        fs::create_dir_all(root.join("av").join(BAG_PARENT)).unwrap();
        fs::write(
            root.join("av").join(BAG_PARENT).join("interview.mp4"),
            ARCHIVE_CONTENT,
        )
        .unwrap();
        let streaming_path = if options.streaming {
            fs::create_dir_all(root.join("springfield/domain/user")).unwrap();
            fs::write(
                root.join("springfield/domain/user/interview.mp4"),
                STREAMING_CONTENT,
            )
            .unwrap();
            "domain/user/interview.mp4"
        } else {
            ""
        };
        fs::write(
            root.join("sources.csv"),
            format!(
                "dataset_id,easy_file_id,path_in_AV_dir,path_in_springfield_dir\n\
                 easy-dataset:1,{},{BAG_PARENT}/interview.mp4,{streaming_path}\n",
                options.archive_id
            ),
        )
        .unwrap();

        let sources = SourcesConfig {
            archive_dir: root.join("av"),
            streaming_dir: root.join("springfield"),
            csv: root.join("sources.csv"),
        };
        Self { dir, sources }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn config(&self, keep_input: bool) -> ConverterConfig {
        ConverterConfig {
            input_dir: self.path("input"),
            output_dir: self.path("output"),
            staging_dir: self.path("staging"),
            keep_input,
        }
    }

    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::load(&self.sources).unwrap()
    }

    fn run(&self, keep_input: bool) -> ConversionTally {
        let catalog = self.catalog();
        let tally = deterministic(Converter::new(self.config(keep_input), &catalog))
            .convert_all()
            .unwrap();
        tally
    }

    fn output_bag(&self, parent: &str, bag: &str) -> PathBuf {
        self.path("output").join(parent).join(bag)
    }

    fn output_dirs(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path("output"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn deterministic(converter: Converter<'_>) -> Converter<'_> {
    converter
        .with_id_allocator(SequentialIds::default())
        .with_clock(FixedClock(
            DateTime::parse_from_rfc3339("2024-05-01T12:00:00.000+02:00").unwrap(),
        ))
}

fn payload_manifest(bag: &Path) -> Manifest {
    Manifest::read(bag, ManifestKind::Payload, DigestAlgorithm::Sha1).unwrap()
}

fn assert_verifies(bag: &Path) {
    let result = verify_bag(bag).unwrap();
    assert!(result.is_ok(), "{}: {:?}", bag.display(), result.errors);
    assert!(result.warnings.is_empty(), "{}: {:?}", bag.display(), result.warnings);
}

fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[derive(Clone, Default)]
struct LogBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn with_logs<T>(f: impl FnOnce() -> T) -> (String, T) {
    let writer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&writer.buf.lock().unwrap()).into_owned();
    (logs, out)
}

#[test]
fn three_revisions_with_streaming_copy() {
    let fx = Fixture::new(FixtureOptions::default());

    let tally = fx.run(false);

    assert_eq!(
        tally,
        ConversionTally {
            processed: 1,
            failed: 0,
            created: 3,
            already_done: 0,
        }
    );
    assert_eq!(fx.output_dirs(), vec![REV2_PARENT, REV3_PARENT, BAG_PARENT]);
    assert!(!fx.path("input").join(BAG_PARENT).exists());
    assert_eq!(fs::read_dir(fx.path("staging")).unwrap().count(), 0);

    // revision 1: archive content substituted, nothing removed
    let rev1 = fx.output_bag(BAG_PARENT, BAG);
    assert_eq!(fs::read(rev1.join("data/video/interview.mp4")).unwrap(), ARCHIVE_CONTENT);
    assert!(rev1.join("data/secret.txt").exists());
    assert!(payload_manifest(&rev1).entries.contains_key("data/video/interview.mp4"));
    let listing = FilesXml::read(&rev1).unwrap();
    assert!(listing.entries().iter().all(|e| !e.has_source));
    assert_eq!(
        BagInfo::read(&rev1).unwrap().get("Payload-Oxum"),
        Some("45.3")
    );
    assert_verifies(&rev1);

    // revision 2: placeholder and none/none removed
    let rev2 = fx.output_bag(REV2_PARENT, REV2_BAG);
    assert!(!rev2.join("data/video").exists());
    assert!(!rev2.join("data/secret.txt").exists());
    assert!(rev2.join("data/public.txt").exists());
    assert_eq!(
        payload_manifest(&rev2).entries.keys().collect::<Vec<_>>(),
        vec!["data/public.txt"]
    );
    let info = BagInfo::read(&rev2).unwrap();
    assert_eq!(info.get("Is-Version-Of"), Some(format!("urn:uuid:{BAG_PARENT}").as_str()));
    assert_eq!(info.get("Created"), Some("2024-05-01T12:00:00.000+02:00"));
    assert_eq!(info.get("Base-DOI"), Some("10.17026/dans-xyz-abcd"));
    assert_eq!(info.get("Base-URN"), Some("urn:nbn:nl:ui:13-xyz"));
    assert_verifies(&rev2);

    // revision 3: streaming copy with the placeholder's rights
    let rev3 = fx.output_bag(REV3_PARENT, REV3_BAG);
    assert_eq!(
        fs::read(rev3.join("data/video/interview-streaming.mp4")).unwrap(),
        STREAMING_CONTENT
    );
    let added = FilesXml::read(&rev3).unwrap().entries().pop().unwrap();
    assert_eq!(added.file_path.as_deref(), Some("data/video/interview-streaming.mp4"));
    assert_eq!(added.accessible_to_rights.as_deref(), Some("ANONYMOUS"));
    assert_eq!(added.visible_to_rights.as_deref(), Some("ANONYMOUS"));
    assert_eq!(
        BagInfo::read(&rev3).unwrap().get("Is-Version-Of"),
        Some(format!("urn:uuid:{REV2_PARENT}").as_str())
    );
    assert_verifies(&rev3);
}

#[test]
fn no_tag_manifest_lists_itself() {
    let fx = Fixture::new(FixtureOptions::default());
    fx.run(true);

    for bag in [
        fx.output_bag(BAG_PARENT, BAG),
        fx.output_bag(REV2_PARENT, REV2_BAG),
        fx.output_bag(REV3_PARENT, REV3_BAG),
    ] {
        let tags = Manifest::read(&bag, ManifestKind::Tag, DigestAlgorithm::Sha1).unwrap();
        assert!(tags.entries.keys().all(|p| !p.starts_with("tagmanifest-")));
        assert!(tags.entries.contains_key("manifest-sha1.txt"));
        assert!(tags.entries.contains_key("bag-info.txt"));
    }
    assert!(fx.path("input").join(BAG_PARENT).exists());
}

#[test]
fn without_streaming_source_only_two_revisions() {
    let fx = Fixture::new(FixtureOptions {
        streaming: false,
        ..FixtureOptions::default()
    });

    let (logs, tally) = with_logs(|| fx.run(false));

    assert_eq!(tally.created, 2);
    assert_eq!(tally.processed, 1);
    assert_eq!(tally.failed, 0);
    assert_eq!(fx.output_dirs(), vec![REV2_PARENT, BAG_PARENT]);
    assert!(logs.contains(&format!("no streaming files found for {BAG_PARENT}")));
}

#[test]
fn missing_visible_rights_keeps_revisions_one_and_two() {
    let fx = Fixture::new(FixtureOptions {
        visible_rights: false,
        ..FixtureOptions::default()
    });

    let tally = fx.run(false);

    assert_eq!(
        tally,
        ConversionTally {
            processed: 1,
            failed: 1,
            created: 2,
            already_done: 0,
        }
    );
    assert_eq!(fx.output_dirs(), vec![REV2_PARENT, BAG_PARENT]);
    assert!(fx.path("input").join(BAG_PARENT).join(BAG).exists());
    // rights are checked before revision 3 is staged
    assert_eq!(fs::read_dir(fx.path("staging")).unwrap().count(), 0);
}

#[test]
fn existing_output_is_left_alone() {
    let fx = Fixture::new(FixtureOptions::default());
    let done = fx.path("output").join(BAG_PARENT);
    fs::create_dir_all(&done).unwrap();
    fs::write(done.join("marker.txt"), b"before").unwrap();

    let tally = fx.run(false);

    assert_eq!(
        tally,
        ConversionTally {
            processed: 0,
            failed: 0,
            created: 0,
            already_done: 1,
        }
    );
    assert_eq!(fx.output_dirs(), vec![BAG_PARENT]);
    assert_eq!(fs::read(done.join("marker.txt")).unwrap(), b"before");
    assert!(fx.path("input").join(BAG_PARENT).exists());
}

#[test]
fn placeholder_ids_differing_from_catalog_fail_the_bag() {
    let fx = Fixture::new(FixtureOptions {
        archive_id: "easy-file:99",
        streaming: false,
        ..FixtureOptions::default()
    });

    let (logs, tally) = with_logs(|| fx.run(false));

    assert_eq!(tally.failed, 1);
    assert_eq!(tally.created, 0);
    assert!(fx.output_dirs().is_empty());
    assert!(fx.path("input").join(BAG_PARENT).exists());
    assert!(logs.contains(&format!("{BAG_PARENT} failed, it may or may not have (incomplete) bags in")));
}

#[test]
fn runs_are_reproducible() {
    let first = Fixture::new(FixtureOptions::default());
    let second = Fixture::new(FixtureOptions::default());

    first.run(false);
    second.run(false);

    let a = tree(&first.path("output"));
    let b = tree(&second.path("output"));
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn non_empty_staging_aborts_before_any_bag() {
    let fx = Fixture::new(FixtureOptions::default());
    fs::write(fx.path("staging/leftover"), b"").unwrap();
    let catalog = fx.catalog();

    let err = Converter::new(fx.config(false), &catalog)
        .convert_all()
        .unwrap_err();

    assert!(matches!(err, AvBagError::StagingNotEmpty { .. }));
    assert!(err.is_fatal());
    assert!(fx.output_dirs().is_empty());
}

#[test]
fn summary_counts_directory_entries() {
    let fx = Fixture::new(FixtureOptions::default());
    let catalog = fx.catalog();
    let converter = deterministic(Converter::new(fx.config(false), &catalog));

    let tally = converter.convert_all().unwrap();
    let line = converter.summary(tally).unwrap().to_string();

    assert_eq!(
        line,
        format!(
            "Conversion finished. Bags processed=1, failed=0, created=3, doneBefore=0. In directories: {}=0, {}=0, {}=3",
            fx.path("input").display(),
            fx.path("staging").display(),
            fx.path("output").display()
        )
    );
}

#[test]
fn listing_path_outside_the_bag_fails_the_bag_and_touches_nothing() {
    let fx = Fixture::new(FixtureOptions::default());
    let victim = fx.path("victim.txt");
    fs::write(&victim, b"beside staging").unwrap();
    let files_xml = fx.path("input").join(BAG_PARENT).join(BAG).join("metadata/files.xml");
    let listing = fs::read_to_string(&files_xml).unwrap().replace(
        "</files>",
        "    <file filepath=\"../../../victim.txt\"/>\n</files>",
    );
    fs::write(&files_xml, listing).unwrap();

    let (logs, tally) = with_logs(|| fx.run(true));

    assert_eq!(
        tally,
        ConversionTally {
            processed: 0,
            failed: 1,
            created: 0,
            already_done: 0,
        }
    );
    assert_eq!(fs::read(&victim).unwrap(), b"beside staging");
    assert!(fx.output_dirs().is_empty());
    assert_eq!(fs::read_dir(fx.path("staging")).unwrap().count(), 0);
    assert!(logs.contains("file path ../../../victim.txt in files.xml is not inside the payload directory"));
}

#[test]
fn failing_bag_does_not_stop_the_next_one() {
    // sorts before BAG_PARENT and has no catalog entries
    const UNMAPPED_PARENT: &str = "0a1b2c3d-0000-4000-8000-000000000000";
    let fx = Fixture::new(FixtureOptions::default());
    copy_dir_recursive(
        &fx.path("input").join(BAG_PARENT),
        &fx.path("input").join(UNMAPPED_PARENT),
    )
    .unwrap();

    let tally = fx.run(false);

    assert_eq!(
        tally,
        ConversionTally {
            processed: 1,
            failed: 1,
            created: 3,
            already_done: 0,
        }
    );
    assert_eq!(fx.output_dirs(), vec![REV2_PARENT, REV3_PARENT, BAG_PARENT]);
    assert_verifies(&fx.output_bag(BAG_PARENT, BAG));
    assert!(fx.path("input").join(UNMAPPED_PARENT).join(BAG).exists());
    assert!(!fx.path("input").join(BAG_PARENT).exists());
}
