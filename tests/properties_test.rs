use proptest::prelude::*;
use serde_json::json;

use squirrels_studio::pager::{Direction, ResultPager, total_pages};
use squirrels_studio::request::{Selections, to_query_params};
use squirrels_studio::{Parameter, ParameterStore};

fn select_param(name: &str, selected: &str) -> Parameter {
    serde_json::from_value(json!({
        "widget_type": "single_select",
        "name": name,
        "options": [{"id": "a"}, {"id": "b"}, {"id": selected}],
        "selected_id": selected
    }))
    .unwrap()
}

fn store_of(names: &[String]) -> ParameterStore {
    ParameterStore::new(names.iter().map(|n| select_param(n, "a")).collect())
}

proptest! {
    #[test]
    fn merge_keeps_order_and_length(
        names in prop::collection::btree_set("[a-z]{1,6}", 1..8),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        strangers in prop::collection::vec("[A-Z]{1,4}", 0..3),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let store = store_of(&names);

        let mut updates: Vec<Parameter> = picks
            .iter()
            .map(|i| select_param(&names[i.index(names.len())], "b"))
            .collect();
        updates.extend(strangers.iter().map(|s| select_param(s, "b")));

        let merged = store.merge_by_name(&updates);
        prop_assert_eq!(merged.names(), store.names());
        prop_assert_eq!(merged.len(), store.len());
        for name in &names {
            let updated = updates.iter().any(|u| &u.name == name);
            let expected = if updated { "b" } else { "a" };
            prop_assert_eq!(merged.get(name).unwrap().current_selection(), vec![expected.to_string()]);
        }
    }

    #[test]
    fn query_params_follow_insertion_order(
        entries in prop::collection::vec(("[a-z]{1,5}", prop::collection::vec("[a-z0-9 ]{0,4}", 0..3)), 0..6),
    ) {
        let selections: Selections = entries.iter().cloned().collect();
        let query = to_query_params(&selections);

        let mut expected = Vec::new();
        for (name, values) in selections.iter() {
            for value in values {
                expected.push(format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)));
            }
        }
        prop_assert_eq!(query, expected.join("&"));
    }

    #[test]
    fn total_pages_matches_ceiling(rows in 0u64..100_000, size in 1usize..5_000) {
        let pages = total_pages(rows, size);
        prop_assert!(pages >= 1);
        if rows > 0 {
            prop_assert_eq!(pages as u64, rows.div_ceil(size as u64));
        } else {
            prop_assert_eq!(pages, 1);
        }
    }

    #[test]
    fn last_and_first_land_on_bounds(rows in 0u64..10_000, size in 1usize..500) {
        let mut pager = ResultPager::new();
        let first = pager.plan_apply("/r", &Selections::new(), size, None);
        pager.commit(first, Some(rows));

        if let Some(last) = pager.plan(Direction::Last) {
            prop_assert_eq!(last.page, total_pages(rows, size));
            pager.commit(last, Some(rows));
        }
        prop_assert_eq!(pager.current_page(), total_pages(rows, size));
        prop_assert!(pager.plan(Direction::Next).is_none());

        match pager.plan(Direction::First) {
            Some(first) => prop_assert_eq!(first.page, 1),
            None => prop_assert_eq!(pager.current_page(), 1),
        }
    }

    #[test]
    fn next_then_prev_returns_to_the_same_request(
        rows in 1u64..10_000,
        size in 1usize..200,
        at in any::<prop::sample::Index>(),
        sql in prop::option::of("[a-z ]{1,12}"),
    ) {
        let pages = total_pages(rows, size);
        prop_assume!(pages >= 3);
        // strictly inside the range so both neighbours exist
        let page = 2 + at.index(pages - 2);

        let mut selections = Selections::new();
        selections.insert("region", vec!["US".to_string(), "EU".to_string()]);
        selections.insert("year", vec!["2024".to_string()]);

        let mut pager = ResultPager::new();
        let mut start = pager.plan_apply("/r", &selections, size, sql.as_deref());
        start.page = page;
        pager.commit(start.clone(), Some(rows));

        let next = pager.plan(Direction::Next).unwrap();
        prop_assert_eq!(next.page, page + 1);
        pager.commit(next, Some(rows));

        let back = pager.plan(Direction::Prev).unwrap();
        prop_assert_eq!(back.url(), start.url());
        prop_assert_eq!(&back, &start);
        pager.commit(back, Some(rows));
        prop_assert_eq!(pager.current_page(), page);
    }
}
