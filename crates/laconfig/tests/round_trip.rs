//! Writing a tree in any format and reading it back gives the same tree
use laconfig::format::{Format, ReadOptions, WriteOptions};
use laconfig::{laconic, ConfigNode, ConfigTree};
use pretty_assertions::assert_eq;

fn sample() -> ConfigTree {
    laconic!(
        r#"app=main
        {
          name="multi\nline \\ value"
          quote="say \"hi\" it's"
          empty=""
          marker=$(/db/$host)
          db{ host=localhost port=5432 }
          db{ name=reporting host="other host" }
          nested=v{ deeper{ deepest{ x=1 } } }
          padded="  padded  "{}
          spaced=" v\n"{ inner{} }
        }"#
    )
}

#[test]
fn every_format_round_trips() {
    let tree = sample();

    for format in Format::ALL {
        for options in [WriteOptions::pretty(), WriteOptions::compact()] {
            let text = format.write(tree.root(), &options).unwrap();
            let again = format.read(&text, &ReadOptions::default()).unwrap();
            assert!(
                again.root().same_content(&tree.root()),
                "{format} {:?}\n{text}",
                options.style
            );
        }
    }
}

#[test]
fn padded_section_values_survive_xml() {
    let tree = sample();
    let xml = Format::Xml.write(tree.root(), &WriteOptions::pretty()).unwrap();
    let again = Format::Xml.read(&xml, &ReadOptions::default()).unwrap();

    let padded = again.root().child("padded");
    assert_eq!(padded.verbatim_value(), Some("  padded  "));
    assert_eq!(again.root().child("spaced").verbatim_value(), Some(" v\n"));
    assert_eq!(again.root().child("nested").verbatim_value(), Some("v"));
}

#[test]
fn laconic_is_stable() {
    let tree = sample();
    let once = tree.root().to_string();
    let twice = laconic!(&once).root().to_string();
    assert_eq!(once, twice);
}

#[test]
fn formats_convert_into_each_other() {
    let tree = sample();
    let xml = Format::Xml.write(tree.root(), &WriteOptions::pretty()).unwrap();
    let from_xml = Format::Xml.read(&xml, &ReadOptions::default()).unwrap();
    let json = Format::Json
        .write(from_xml.root(), &WriteOptions::compact())
        .unwrap();
    let from_json = Format::Json.read(&json, &ReadOptions::default()).unwrap();

    assert!(from_json.root().same_content(&tree.root()));
    assert_eq!(
        from_json.root().navigate("/db[name=reporting]/$host").unwrap().value().unwrap(),
        "other host"
    );
}
