//! Document sink behaviour across threads and retention modes.

use std::fs;
use std::thread;

use dbscribe::document::{ContentRetention, DocumentSink};
use dbscribe::metadata::{ColumnDescriptor, KeyDescriptor, TableDescriptor, TableMetadata};

fn table(owner: &str, name: &str, comment: Option<&str>) -> TableMetadata {
    let mut metadata = TableMetadata::new(
        TableDescriptor::new(owner, name).with_comment(comment.map(str::to_string)),
    );
    metadata.columns = vec![ColumnDescriptor::from_catalog(
        "ID", "INTEGER", None, None, None, false, None, None, 1,
    )];
    metadata
}

fn toc_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| l.starts_with("- [")).collect()
}

fn headings(text: &str) -> Vec<&str> {
    text.lines().filter_map(|l| l.strip_prefix("### ")).collect()
}

#[test]
fn test_concurrent_writers_produce_sorted_document() {
    for retention in [ContentRetention::Stream, ContentRetention::InMemory] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.md");
        let sink = DocumentSink::open(&path, retention).unwrap();

        // 8 writers, 25 disjoint tables each, interleaved names.
        thread::scope(|s| {
            for worker in 0..8 {
                let sink = &sink;
                s.spawn(move || {
                    for i in 0..25 {
                        let name = format!("T{:03}", i * 8 + worker);
                        sink.write_table(&table("APP", &name, None)).unwrap();
                    }
                });
            }
        });
        assert_eq!(sink.table_count(), 200);

        let rendered: Vec<String> = (0..200)
            .map(|i| dbscribe::document::render::section(&table("APP", &format!("T{i:03}"), None)))
            .collect();

        let finalized = sink.finalize().unwrap();
        assert_eq!(finalized, path);
        assert!(!dir.path().join("schema.md.final").exists());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("*Updated: "));
        assert!(!text.contains("*Generated: "));

        let toc = toc_lines(&text);
        assert_eq!(toc.len(), 200);
        assert!(toc.windows(2).all(|w| w[0] < w[1]), "index strictly sorted");

        let heads = headings(&text);
        assert_eq!(heads.len(), 200);
        for (i, heading) in heads.iter().enumerate() {
            assert_eq!(*heading, format!("APP.T{i:03}"));
            assert!(toc[i].starts_with(&format!("- [{heading}](#APP.T{i:03})")));
        }

        for section in &rendered {
            assert!(text.contains(section.as_str()), "section missing verbatim");
        }
    }
}

#[test]
fn test_streamed_header_before_finalize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.md");
    let _sink = DocumentSink::open(&path, ContentRetention::Stream).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "# Database Schema Reference");
    assert!(lines[2].starts_with("*Generated: "));
    assert_eq!(lines[4], "## Tables");
    assert_eq!(lines[7], "## Table Details");
    assert!(toc_lines(&text).is_empty());
}

#[test]
fn test_finalized_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.md");
    let sink = DocumentSink::open(&path, ContentRetention::Stream).unwrap();

    let mut users = table("APP", "USERS", Some("Accounts"));
    users.primary_key = KeyDescriptor::new(vec!["ID".to_string()]);
    sink.write_table(&users).unwrap();
    sink.write_table(&table("APP", "ORDERS", None)).unwrap();
    sink.finalize().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    // Title, blank, timestamp, blank.
    let body = text.lines().skip(4).collect::<Vec<_>>().join("\n");

    insta::assert_snapshot!(body.trim_end(), @r###"
    ## Tables

    - [APP.ORDERS](#APP.ORDERS) - No description
    - [APP.USERS](#APP.USERS) - Accounts

    ## Table Details

    <a id="APP.ORDERS"></a>
    ### APP.ORDERS

    **Comment**: No description

    **Rows**: -

    **Last analyzed**: -

    #### Columns

    | # | Name | Type | Nullable | Default | Comment |
    | --- | --- | --- | --- | --- | --- |
    | 1 | ID | INTEGER | NO | - | No description |

    <a id="APP.USERS"></a>
    ### APP.USERS

    **Comment**: Accounts

    **Rows**: -

    **Last analyzed**: -

    #### Columns

    | # | Name | Type | Nullable | Default | Comment |
    | --- | --- | --- | --- | --- | --- |
    | 1 | ID | INTEGER | NO | - | No description |

    #### Primary Key

    | Column |
    | --- |
    | ID |
    "###);
}

#[test]
fn test_empty_comment_kept_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.md");
    let sink = DocumentSink::open(&path, ContentRetention::InMemory).unwrap();
    sink.write_table(&table("APP", "BLANK", Some(""))).unwrap();
    sink.write_table(&table("APP", "NONE", None)).unwrap();
    sink.finalize().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("- [APP.BLANK](#APP.BLANK) - -"));
    assert!(text.contains("- [APP.NONE](#APP.NONE) - No description"));
}
