//! Concurrent reads of one shared tree
use laconfig::{laconic, ConfigNode, ConfigTree};
use rayon::prelude::*;

fn shared() -> ConfigTree {
    laconic!(
        r#"root
        {
          vars
          {
            var1=val1
            var3=$(../$var4)
            var4=$(../$var3)
            many { a{ age=17 } a{ age=18 who=$(/vars/$var1) } }
          }
          url="http://$(/service/$host):$(/service/$port)/"
          service{ host=localhost port=8080 }
        }"#
    )
}

#[test]
fn parallel_navigation() {
    let tree = shared();

    (0..100_000).into_par_iter().for_each(|i| {
        let age = if i % 2 == 0 { 17 } else { 18 };
        let section = tree
            .root()
            .navigate_section(&format!("/vars/many/a[age={age}]"))
            .unwrap();
        assert!(section.exists());
        assert_eq!(section.attr("age").value_as::<u32>().unwrap(), age);
        assert!(!tree.root().navigate("/GGG/b/c").unwrap().exists());
    });
}

#[test]
fn parallel_evaluation() {
    let tree = shared();

    (0..100_000).into_par_iter().for_each(|i| match i % 3 {
        0 => assert_eq!(
            tree.root().attr("url").value().unwrap(),
            "http://localhost:8080/"
        ),
        1 => assert!(tree
            .root()
            .child("vars")
            .attr("var3")
            .value()
            .unwrap_err()
            .is_recursive_variable()),
        _ => assert_eq!(
            tree.root()
                .navigate("/vars/many/a[age=18]/$who")
                .unwrap()
                .value()
                .unwrap(),
            "val1"
        ),
    });
}
