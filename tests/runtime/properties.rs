//! Property tests for session bindings

use proptest::prelude::*;

use crate::{plain, run, session_in};

fn identifier() -> impl Strategy<Value = String> {
    "v[a-zA-Z0-9_]{0,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A bound integer renders the same as the literal it was bound to.
    #[test]
    fn bound_values_render_like_literals(name in identifier(), n in -100_000i64..100_000) {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        let (reply, out) = run(&mut session, &format!("{name} = {n}"));
        prop_assert!(reply.is_ok());
        prop_assert_eq!(out.stdout_text(), "Added 1 variables.\n");
        prop_assert_eq!(plain(&mut session, &name), n.to_string());
    }

    /// The most recent binding of a name wins.
    #[test]
    fn last_binding_wins(name in identifier(), values in prop::collection::vec(0i64..1000, 1..5)) {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        for value in &values {
            run(&mut session, &format!("{name} = {value}"));
        }
        let last = values.last().copied().unwrap_or_default();
        prop_assert_eq!(plain(&mut session, &name), last.to_string());
    }

    /// `:add { x = V; }` then `x` renders like `V` itself.
    #[test]
    fn added_attributes_render_like_their_source(
        name in identifier(),
        items in prop::collection::vec(0i64..100, 0..4),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        let source = format!("[ {} ]", items.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "));

        let (reply, out) = run(&mut session, &format!(":add {{ {name} = {source}; }}"));
        prop_assert!(reply.is_ok());
        prop_assert_eq!(out.stdout_text(), "Added 1 variables.\n");
        let direct = plain(&mut session, &source);
        prop_assert_eq!(plain(&mut session, &name), direct);
    }
}
