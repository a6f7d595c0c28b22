use std::io::Write as _;

use chrono::NaiveDate;
use serde_json::json;

use super::*;
use crate::view::FwfViewLike;

const DATA: &[u8] = b"# My comment test\n\
US       AR19570526Fbe56008be36eDianne Mcintosh         Whatever    Medic        #\n\
US       MI19940213M706a6e0afc3dRosalyn Clark           Whatever    Comedian     #\n\
US       WI19510403M451ed630accbShirley Gray            Whatever    Comedian     #\n\
US       MD20110508F7e5cd7324f38Georgia Frank           Whatever    Comedian     #\n\
US       PA19930404Mecc7f17c16a6Virginia Lambert        Whatever    Shark tammer #\n\
US       VT19770319Fd2bd88100facRichard Botto           Whatever    Time traveler#\n\
US       OK19910917F9c704139a6e3Alberto Giel            Whatever    Student      #\n\
US       NV20120604F5f02187599d7Mildred Henke           Whatever    Super hero   #\n\
US       AR19820125Fcf54b2eb5219Marc Kidd               Whatever    Medic        #\n\
US       ME20080503F0f51da89a299Kelly Crose             Whatever    Comedian     #\n";

fn human_schema() -> FileSchema {
    FileSchema::new(vec![
        FieldDef::with_len("location", 9),
        FieldDef::with_len("state", 2),
        FieldDef::with_len("birthday", 8),
        FieldDef::with_len("gender", 1),
        FieldDef::with_len("name", 36),
        FieldDef::with_len("universe", 12),
        FieldDef::with_len("profession", 13),
        FieldDef::with_len("dummy", 1),
    ])
}

fn id_schema() -> FileSchema {
    FileSchema::new(vec![FieldDef::with_len("id", 3)])
}

const DATA_1: &[u8] = b"#\n\
1     19990101 21991231 20180101\n\
2     20180101 20181231 20180201\n\
3     20180201 20180231 20180301\n\
4     20180301 21991231 20180401\n\
5     20180415 20180931 20180501\n\
6     20180501 20190331 20180601\n\
7     20180501 21991231 20180701\n\
8     20180505 20181001 20180801\n\
9     20180515 20181231 20180901\n\
10    20180531 20180601 20181001\n";

const DATA_2: &[u8] = b"#\n\
1     19990101 21991231 20180101\n\
22    20180101 20181231 20180201\n\
3     20180201 20180231 20180301\n\
4     20180301 21991231 20180401\n\
5     20180415 20180931 20180501\n\
6     20180501 20190331 20180601\n\
7     20180501 21991231 20180701\n\
8     20180505 20181001 20180801\n\
9     20180515 20181231 20180901\n\
10    20180531 20180601 20181001\n";

fn changelog_schema() -> FileSchema {
    FileSchema::new(vec![
        FieldDef::with_len("ID", 5),
        FieldDef::with_len("valid_from", 9).attr("dtype", json!("int32")),
        FieldDef::with_len("valid_until", 9).attr("dtype", json!("int32")),
        FieldDef::with_len("changed", 9).attr("dtype", json!("int32")),
    ])
}

// ------------------------------------------------------------------
// Field specifications
// ------------------------------------------------------------------

#[test]
fn test_fieldspec_shapes() {
    let field = FwfFieldSpec::new(7, &FieldDef::with_len("a", 5)).unwrap();
    assert_eq!((field.start(), field.stop()), (7, 12));
    assert_eq!(field.len(), 5);

    let field = FwfFieldSpec::new(0, &FieldDef::with_span("a", 3, 9)).unwrap();
    assert_eq!((field.start(), field.stop()), (3, 9));

    let field = FwfFieldSpec::new(0, &FieldDef::with_slice("a", (2, 4))).unwrap();
    assert_eq!((field.start(), field.stop()), (2, 4));

    let def = FieldDef {
        name: "a".to_string(),
        start: Some(10),
        len: Some(4),
        ..FieldDef::default()
    };
    let field = FwfFieldSpec::new(0, &def).unwrap();
    assert_eq!((field.start(), field.stop()), (10, 14));

    let def = FieldDef {
        name: "a".to_string(),
        stop: Some(14),
        len: Some(4),
        ..FieldDef::default()
    };
    let field = FwfFieldSpec::new(0, &def).unwrap();
    assert_eq!((field.start(), field.stop()), (10, 14));
}

#[test]
fn test_fieldspec_conflicts() {
    let def = FieldDef {
        name: "a".to_string(),
        slice: Some((0, 4)),
        len: Some(4),
        ..FieldDef::default()
    };
    assert!(matches!(
        FwfFieldSpec::new(0, &def),
        Err(FwfError::Schema(_))
    ));

    let def = FieldDef {
        name: "a".to_string(),
        start: Some(0),
        stop: Some(4),
        len: Some(4),
        ..FieldDef::default()
    };
    assert!(matches!(
        FwfFieldSpec::new(0, &def),
        Err(FwfError::Schema(_))
    ));

    let def = FieldDef {
        name: "a".to_string(),
        ..FieldDef::default()
    };
    assert!(matches!(
        FwfFieldSpec::new(0, &def),
        Err(FwfError::Schema(_))
    ));
}

#[test]
fn test_fieldspec_limits() {
    assert!(FwfFieldSpec::new(0, &FieldDef::with_len("a", 0)).is_err());
    assert!(FwfFieldSpec::new(0, &FieldDef::with_len("a", 1000)).is_err());
    assert!(FwfFieldSpec::new(0, &FieldDef::with_len("a", 999)).is_ok());
    assert!(FwfFieldSpec::new(0, &FieldDef::with_len("", 3)).is_err());
    assert!(FwfFieldSpec::new(0, &FieldDef::with_span("a", 5, 3)).is_err());

    let specs = FwfFileFieldSpecs::new(&[
        FieldDef::with_len("a", 3),
        FieldDef::with_len("a", 3),
    ]);
    assert!(matches!(specs, Err(FwfError::Schema(_))));
}

#[test]
fn test_fieldspec_attrs_preserved() {
    let def = FieldDef::with_len("valid_from", 9)
        .attr("dtype", json!("int32"))
        .attr("default", json!(19990101));
    let field = FwfFieldSpec::new(0, &def).unwrap();
    assert_eq!(field.attr("dtype"), Some(&json!("int32")));
    assert_eq!(field.attr("default"), Some(&json!(19990101)));
    assert_eq!(field.attr("regex"), None);
}

#[test]
fn test_schema_from_json() {
    let schema: FileSchema = serde_json::from_str(
        r##"{
            "fields": [
                {"name": "id", "len": 3, "dtype": "int32"},
                {"name": "text", "start": 3, "stop": 7}
            ],
            "encoding": "utf-8",
            "comments": "#"
        }"##,
    )
    .unwrap();

    let specs = FwfFileFieldSpecs::new(&schema.fields).unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs["id"].range(), 0..3);
    assert_eq!(specs["text"].range(), 3..7);
    assert_eq!(specs["id"].attr("dtype"), Some(&json!("int32")));
    assert_eq!(specs.reclen(), 7);
}

#[test]
fn test_record_length_is_max_stop() {
    // Specs may contain gaps and overlaps; the record length is the
    // maximum stop, not the sum of lengths.
    let specs = FwfFileFieldSpecs::new(&[
        FieldDef::with_span("a", 0, 10),
        FieldDef::with_span("b", 5, 8),
    ])
    .unwrap();
    assert_eq!(specs.reclen(), 10);

    // A len-only field appended after a span starts at the record length.
    let specs = FwfFileFieldSpecs::new(&[
        FieldDef::with_span("a", 0, 10),
        FieldDef::with_len("b", 2),
    ])
    .unwrap();
    assert_eq!(specs["b"].range(), 10..12);
    assert_eq!(specs.reclen(), 12);
}

#[test]
fn test_specs_lookup_and_order() {
    let specs = FwfFileFieldSpecs::new(&human_schema().fields).unwrap();
    assert_eq!(specs.len(), 8);
    assert_eq!(specs.reclen(), 82);
    assert!(specs.contains("gender"));
    assert!(!specs.contains("nope"));
    assert!(matches!(specs.field("nope"), Err(FwfError::Schema(_))));

    let names: Vec<&str> = specs.names().collect();
    assert_eq!(names[0], "location");
    assert_eq!(names[7], "dummy");
    assert_eq!(specs.at(1).unwrap().name(), "state");
    assert_eq!(specs["state"].range(), 9..11);
}

#[test]
fn test_specs_add_update_clone() {
    let mut specs = FwfFileFieldSpecs::new(&[]).unwrap();
    assert_eq!(specs.reclen(), 0);

    specs.add_field(&FieldDef::with_len("location", 9)).unwrap();
    specs.add_field(&FieldDef::with_len("state", 2)).unwrap();
    specs.add_field(&FieldDef::with_len("name", 20)).unwrap();
    assert_eq!(specs["location"].range(), 0..9);
    assert_eq!(specs["state"].range(), 9..11);
    assert_eq!(specs["name"].range(), 11..31);
    assert_eq!(specs.reclen(), 31);

    let def = FieldDef {
        name: "name".to_string(),
        start: Some(20),
        len: Some(10),
        ..FieldDef::default()
    };
    specs.update_field("name", &def).unwrap();
    assert_eq!(specs["name"].range(), 20..30);
    assert_eq!(specs.reclen(), 30);

    let projected = specs.clone_select(&["name", "state"]).unwrap();
    assert_eq!(projected.len(), 2);
    let names: Vec<&str> = projected.names().collect();
    assert_eq!(names, vec!["name", "state"]);
    assert_eq!(projected["state"].range(), 9..11);
    assert!(projected.clone_select(&["nope"]).is_err());
}

// ------------------------------------------------------------------
// File substrate
// ------------------------------------------------------------------

#[test]
fn test_open_bytes_geometry() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    assert!(fwf.is_open());
    assert_eq!(fwf.newline_width(), 1);
    assert_eq!(fwf.fwidth(), 83);
    assert_eq!(fwf.start_pos(), 18);
    assert_eq!(fwf.fsize(), DATA.len());
    assert_eq!(fwf.line_count(), 10);
    assert_eq!(fwf.count(), 10);
}

#[test]
fn test_open_path() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(DATA).unwrap();
    tmp.flush().unwrap();

    let mut fwf = FwfFile::open(&human_schema(), tmp.path()).unwrap();
    assert_eq!(fwf.path(), Some(tmp.path()));
    assert_eq!(fwf.line_count(), 10);
    assert_eq!(fwf.raw_line_at(0).unwrap().len(), 83);
    fwf.close();
}

#[test]
fn test_close_is_idempotent_and_detected() {
    let mut fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    fwf.close();
    fwf.close();
    assert!(!fwf.is_open());

    assert!(matches!(fwf.data(), Err(FwfError::InvalidState(_))));
    assert!(matches!(
        fwf.raw_line_at(0),
        Err(FwfError::InvalidState(_))
    ));
    assert!(matches!(fwf.line_at(0), Err(FwfError::InvalidState(_))));
    assert!(matches!(
        fwf.iter_bytes(),
        Err(FwfError::InvalidState(_))
    ));

    // Geometry stays readable after close.
    assert_eq!(fwf.line_count(), 10);
}

#[test]
fn test_empty_and_comment_only_input() {
    for data in [&b""[..], b"#", b"# empty", b"# empty \n"] {
        let fwf = FwfFile::from_bytes(&id_schema(), data.to_vec()).unwrap();
        assert_eq!(fwf.line_count(), 0, "input {:?}", data);
        assert_eq!(fwf.iter_lines().count(), 0);
    }
}

#[test]
fn test_single_record_with_and_without_newline() {
    let fwf = FwfFile::from_bytes(&id_schema(), b"000".to_vec()).unwrap();
    assert_eq!(fwf.line_count(), 1);
    assert_eq!(fwf.fsize(), 4);
    assert_eq!(fwf.raw_line_at(0).unwrap(), b"000");

    let fwf = FwfFile::from_bytes(&id_schema(), b"000\n".to_vec()).unwrap();
    assert_eq!(fwf.line_count(), 1);
    assert_eq!(fwf.raw_line_at(0).unwrap(), b"000\n");

    let fwf = FwfFile::from_bytes(&id_schema(), b"000\n001".to_vec()).unwrap();
    assert_eq!(fwf.line_count(), 2);
    assert_eq!(fwf.raw_line_at(1).unwrap(), b"001");
}

#[test]
fn test_crlf_and_custom_newlines() {
    let fwf = FwfFile::from_bytes(&id_schema(), b"000\r\n001\r\n".to_vec()).unwrap();
    assert_eq!(fwf.newline_width(), 2);
    assert_eq!(fwf.fwidth(), 5);
    assert_eq!(fwf.line_count(), 2);
    assert_eq!(fwf.raw_line_at(1).unwrap(), b"001\r\n");

    let fwf = FwfFile::from_bytes(&id_schema(), b"000\x00001\x00".to_vec()).unwrap();
    assert_eq!(fwf.newline_width(), 1);
    assert_eq!(fwf.line_count(), 2);

    // The width observed first wins; a later different width does not
    // change the geometry.
    let fwf = FwfFile::from_bytes(&id_schema(), b"000\r\n001\n".to_vec()).unwrap();
    assert_eq!(fwf.newline_width(), 2);
    assert_eq!(fwf.line_count(), 1);
}

#[test]
fn test_missing_newline_is_invalid_format() {
    // No newline within the detection window, and far more data than one
    // record could hold.
    let err = FwfFile::from_bytes(&id_schema(), vec![b'7'; 20_000]);
    assert!(matches!(err, Err(FwfError::InvalidFormat(_))));

    // A short buffer scanned to its end degenerates to one line.
    let fwf = FwfFile::from_bytes(&id_schema(), b"000".to_vec()).unwrap();
    assert_eq!(fwf.line_count(), 1);
}

#[test]
fn test_comment_scan_cap() {
    let schema = id_schema().with_comment_scan_cap(8);
    let data = b"# a very long comment line\n000\n".to_vec();
    assert!(matches!(
        FwfFile::from_bytes(&schema, data),
        Err(FwfError::InvalidFormat(_))
    ));

    let data = b"# a very long comment line\n000\n".to_vec();
    let fwf = FwfFile::from_bytes(&id_schema(), data).unwrap();
    assert_eq!(fwf.line_count(), 1);
}

#[test]
fn test_pos_from_index() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    assert_eq!(fwf.pos_from_index(0).unwrap(), 18);
    assert_eq!(fwf.pos_from_index(1).unwrap(), 18 + 83);
    assert_eq!(fwf.pos_from_index(-1).unwrap(), 18 + 9 * 83);
    assert!(matches!(
        fwf.pos_from_index(10),
        Err(FwfError::OutOfBounds { index: 10, len: 10 })
    ));
    assert!(fwf.pos_from_index(-11).is_err());
}

#[test]
fn test_iter_bytes_and_field_bytes() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let records = fwf.iter_bytes().unwrap();
    assert_eq!(records.len(), 10);
    let records: Vec<&[u8]> = records.collect();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|rec| rec.len() == 83));
    assert!(records[0].starts_with(b"US       AR19570526F"));

    let states: Vec<&[u8]> = fwf.iter_field_bytes("state").unwrap().collect();
    assert_eq!(states.len(), 10);
    assert_eq!(states[0], b"AR");
    assert_eq!(states[1], b"MI");
    assert_eq!(states[9], b"ME");

    assert!(fwf.iter_field_bytes("nope").is_err());
}

// ------------------------------------------------------------------
// Views
// ------------------------------------------------------------------

#[test]
fn test_line_at_and_negative_index() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let line = fwf.line_at(0).unwrap();
    assert_eq!(line.lineno(), 0);
    assert_eq!(line.get("birthday").unwrap(), b"19570526");

    let line = fwf.line_at(-1).unwrap();
    assert_eq!(line.lineno(), 9);
    assert_eq!(line.get("birthday").unwrap(), b"20080503");

    assert!(matches!(
        fwf.line_at(10),
        Err(FwfError::OutOfBounds { .. })
    ));
    assert!(fwf.line_at(-11).is_err());
}

#[test]
fn test_slice_region() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let region = fwf.slice(Some(0), Some(5)).unwrap();
    assert_eq!(region.count(), 5);
    assert_eq!(region.line_at(0).unwrap().get("state").unwrap(), b"AR");
    assert_eq!(region.line_at(4).unwrap().get("state").unwrap(), b"PA");

    let all = fwf.slice(None, None).unwrap();
    assert_eq!(all.count(), 10);

    let tail = fwf.slice(Some(-2), None).unwrap();
    assert_eq!(tail.count(), 2);
    assert_eq!(tail.line_at(0).unwrap().get("state").unwrap(), b"AR");

    assert!(fwf.slice(Some(3), Some(2)).is_err());
    assert!(fwf.slice(Some(0), Some(11)).is_err());
}

#[test]
fn test_region_composition_flattens() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let outer = fwf.slice(Some(2), Some(8)).unwrap();
    let inner = outer.slice(Some(1), Some(4)).unwrap();

    // Region(Region(V, 2, 8), 1, 4) == Region(V, 3, 6)
    assert_eq!((inner.start(), inner.stop()), (3, 6));
    assert_eq!(inner.count(), 3);
    let (root, lineno) = inner.rooted(0, None);
    assert_eq!(lineno, 3);
    assert_eq!(root.count(), 10);

    for i in 0..inner.count() {
        let (_, rooted) = inner.rooted(i, None);
        assert_eq!(
            inner.raw_line_at(i).unwrap(),
            fwf.raw_line_at(rooted).unwrap()
        );
    }
}

#[test]
fn test_region_select_flattens() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let region = fwf.slice(Some(2), Some(8)).unwrap();
    let subset = region.select(&[0, 2, -1]).unwrap();
    assert_eq!(subset.lines(), &[2, 4, 7]);
    assert_eq!(subset.line_at(1).unwrap().get("state").unwrap(), b"PA");
}

#[test]
fn test_subset_slice_and_select() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let subset = fwf.select(&[1, 3, 5, 7]).unwrap();
    assert_eq!(subset.count(), 4);

    // Slicing a subset stays a region over the subset.
    let region = subset.slice(Some(1), Some(3)).unwrap();
    assert_eq!(region.count(), 2);
    let (root, lineno) = region.rooted(0, None);
    assert_eq!(root.count(), 10);
    assert_eq!(lineno, 3);

    // Selecting from a subset flattens through its index list.
    let picked = subset.select(&[0, 2]).unwrap();
    assert_eq!(picked.lines(), &[1, 5]);

    assert!(subset.select(&[4]).is_err());
}

#[test]
fn test_bool_mask() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let subset = fwf.mask(&[true, false, true, false, false, false, false, false, false, true]);
    assert_eq!(subset.lines(), &[0, 2, 9]);

    // A short mask implies false for the remaining lines.
    let subset = fwf.mask(&[false, true]);
    assert_eq!(subset.lines(), &[1]);

    // Extra entries beyond the view are ignored.
    let subset = fwf.mask(&[true; 20]);
    assert_eq!(subset.count(), 10);
}

#[test]
fn test_iter_and_lines() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let mut count = 0;
    for entry in fwf.iter() {
        let line = entry.unwrap();
        assert_eq!(line.lineno(), count);
        assert_eq!(line.data().len(), 83);
        count += 1;
    }
    assert_eq!(count, 10);

    let mut lines = fwf.iter();
    let line = lines.nth(5).unwrap().unwrap();
    assert_eq!(line.lineno(), 5);
    assert_eq!(line.get("state").unwrap(), b"VT");
    assert_eq!(lines.len(), 4);

    let values: Vec<&[u8]> = fwf
        .iter_field("gender")
        .unwrap()
        .map(|value| value.unwrap())
        .collect();
    assert_eq!(values, vec![
        &b"F"[..], b"M", b"M", b"F", b"M", b"F", b"F", b"F", b"F", b"F"
    ]);
}

#[test]
fn test_rooted_with_stop_view() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let outer = fwf.slice(Some(2), Some(8)).unwrap();
    let subset = outer.select(&[1, 3]).unwrap();

    let (root, lineno) = subset.rooted(1, None);
    assert_eq!(lineno, 5);
    assert_eq!(root.count(), 10);

    let (stopped, lineno) = subset.rooted(1, Some(subset.as_view()));
    assert_eq!(lineno, 1);
    assert_eq!(stopped.count(), 2);
}

// ------------------------------------------------------------------
// Lines
// ------------------------------------------------------------------

#[test]
fn test_line_accessors() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    let line = fwf.line_at(0).unwrap();

    assert_eq!(line.get("state").unwrap(), b"AR");
    assert_eq!(line.str("state").unwrap(), "AR");
    assert_eq!(line.int("birthday").unwrap(), 19570526);
    assert_eq!(
        line.date("birthday").unwrap(),
        NaiveDate::from_ymd_opt(1957, 5, 26).unwrap()
    );
    assert!(matches!(line.get("nope"), Err(FwfError::Schema(_))));
    assert!(matches!(
        line.int("state"),
        Err(FwfError::Parse { lineno: 0, .. })
    ));

    let items: Vec<(&str, &[u8])> = line.items().collect();
    assert_eq!(items.len(), 8);
    assert_eq!(items[1], ("state", &b"AR"[..]));

    let values = line.to_vec(&["gender", "state"]).unwrap();
    assert_eq!(values, vec![&b"F"[..], b"AR"]);
}

#[test]
fn test_line_rooted() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    let region = fwf.slice(Some(3), Some(8)).unwrap();

    let line = region.line_at(1).unwrap();
    assert_eq!(line.lineno(), 1);

    let rooted = line.rooted(None);
    assert_eq!(rooted.lineno(), 4);
    assert_eq!(rooted.data(), line.data());
}

// ------------------------------------------------------------------
// Predicates, filter, sort, unique
// ------------------------------------------------------------------

#[test]
fn test_filter_gender() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let males = fwf.filter(vec![op("gender").eq(b"M")], false).unwrap();
    assert_eq!(males.lines(), &[1, 2, 4]);

    let males = fwf.filter_by_field_value("gender", b"M").unwrap();
    assert_eq!(males.lines(), &[1, 2, 4]);

    let females = fwf.exclude(vec![op("gender").eq(b"M")], false).unwrap();
    assert_eq!(females.count(), 7);
}

#[test]
fn test_filter_combinators() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let both = fwf
        .filter(
            vec![op("gender").eq(b"M"), op("state").eq(b"MI")],
            false,
        )
        .unwrap();
    assert_eq!(both.lines(), &[1]);

    let either = fwf
        .filter(
            vec![op("state").eq(b"AR"), op("state").eq(b"ME")],
            true,
        )
        .unwrap();
    assert_eq!(either.lines(), &[0, 8, 9]);

    let none = fwf.filter(vec![], true).unwrap();
    assert_eq!(none.count(), 0);
    let all = fwf.filter(vec![], false).unwrap();
    assert_eq!(all.count(), 10);
}

#[test]
fn test_operator_transform_chain() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let medics = fwf
        .filter(vec![op("profession").str().strip().eq("Medic")], false)
        .unwrap();
    assert_eq!(medics.lines(), &[0, 8]);

    let medics = fwf
        .filter(
            vec![op("profession").strip().lower().eq(b"medic")],
            false,
        )
        .unwrap();
    assert_eq!(medics.lines(), &[0, 8]);

    let modern = fwf
        .filter(vec![op("birthday").int().ge(20000000)], false)
        .unwrap();
    assert_eq!(modern.lines(), &[3, 7, 9]);

    let south = fwf
        .filter(vec![op("state").is_in(&[&b"AR"[..], &b"MI"[..]])], false)
        .unwrap();
    assert_eq!(south.lines(), &[0, 1, 8]);

    let rest = fwf
        .filter(vec![op("state").not_in(&[&b"AR"[..], &b"MI"[..]])], false)
        .unwrap();
    assert_eq!(rest.count(), 7);
}

#[test]
fn test_operator_error_propagates() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    // 'state' is not numeric: the predicate's parse failure surfaces.
    let result = fwf.filter(vec![op("state").int().eq(1)], false);
    assert!(matches!(result, Err(FwfError::Parse { lineno: 0, .. })));
}

#[test]
fn test_filter_on_region() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();
    let region = fwf.slice(Some(2), Some(8)).unwrap();

    let males = region.filter(vec![op("gender").eq(b"M")], false).unwrap();
    // Flattened onto the file: parent-space line numbers.
    assert_eq!(males.lines(), &[2, 4]);
}

#[test]
fn test_order_by() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    let ordered = fwf.order_by(&["state", "-birthday"]).unwrap();
    assert_eq!(ordered.count(), 10);

    // Both AR rows first, the younger one before the older one.
    assert_eq!(ordered.lines()[0], 8);
    assert_eq!(ordered.lines()[1], 0);
    let first = ordered.line_at(0).unwrap();
    assert_eq!(first.get("state").unwrap(), b"AR");
    assert_eq!(first.get("birthday").unwrap(), b"19820125");
    let second = ordered.line_at(1).unwrap();
    assert_eq!(second.get("birthday").unwrap(), b"19570526");

    let states: Vec<Vec<u8>> = ordered
        .iter()
        .map(|entry| entry.unwrap().get("state").unwrap().to_vec())
        .collect();
    let mut sorted = states.clone();
    sorted.sort();
    assert_eq!(states, sorted);

    assert!(fwf.order_by(&["nope"]).is_err());
}

#[test]
fn test_unique() {
    let fwf = FwfFile::from_bytes(&human_schema(), DATA.to_vec()).unwrap();

    assert_eq!(fwf.unique(&["gender"]).unwrap().len(), 2);
    assert_eq!(fwf.unique(&["state"]).unwrap().len(), 9);

    let pairs = fwf.unique(&["state", "gender"]).unwrap();
    assert!(pairs.contains(&vec![b"AR".to_vec(), b"F".to_vec()]));
    assert_eq!(pairs.len(), 9);
}

// ------------------------------------------------------------------
// Multi-file
// ------------------------------------------------------------------

#[test]
fn test_multi_file_addressing() {
    let schema = changelog_schema();
    let mut multi = FwfMultiFile::new();
    multi.add_bytes(&schema, DATA_1.to_vec()).unwrap();
    multi.add_bytes(&schema, DATA_2.to_vec()).unwrap();

    assert_eq!(multi.files().len(), 2);
    assert_eq!(multi.line_count(), 20);
    assert_eq!(multi.count(), 20);

    assert_eq!(multi.translate(0).unwrap(), (0, 0));
    assert_eq!(multi.translate(9).unwrap(), (0, 9));
    assert_eq!(multi.translate(10).unwrap(), (1, 0));
    assert_eq!(multi.translate(19).unwrap(), (1, 9));
    assert!(matches!(
        multi.translate(20),
        Err(FwfError::OutOfBounds { .. })
    ));

    assert_eq!(multi.line_at(1).unwrap().get("ID").unwrap(), b"2    ");
    assert_eq!(multi.line_at(11).unwrap().get("ID").unwrap(), b"22   ");
    assert_eq!(multi.line_at(-1).unwrap().get("ID").unwrap(), b"10   ");

    assert_eq!(multi.iter().count(), 20);

    let subset = multi.select(&[0, 11]).unwrap();
    let (root, lineno) = subset.rooted(1, None);
    assert_eq!(root.count(), 20);
    assert_eq!(lineno, 11);
}

#[test]
fn test_multi_file_close() {
    let schema = changelog_schema();
    let mut multi = FwfMultiFile::new();
    multi.add_bytes(&schema, DATA_1.to_vec()).unwrap();
    multi.add_bytes(&schema, DATA_2.to_vec()).unwrap();

    multi.close();
    assert!(multi.files().iter().all(|file| !file.is_open()));
    assert!(matches!(
        multi.raw_line_at(0),
        Err(FwfError::InvalidState(_))
    ));
}

#[test]
fn test_multi_file_filter() {
    let schema = changelog_schema();
    let mut multi = FwfMultiFile::new();
    multi.add_bytes(&schema, DATA_1.to_vec()).unwrap();
    multi.add_bytes(&schema, DATA_2.to_vec()).unwrap();

    let hits = multi
        .filter(vec![op("ID").strip().eq(b"22")], false)
        .unwrap();
    assert_eq!(hits.lines(), &[11]);
}
