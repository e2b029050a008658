use kbreason_prover::{interpret, RawProverOutput, SolverLimits};
use proptest::prelude::*;

fn output(stdout: String, variables: Vec<String>) -> RawProverOutput {
    RawProverOutput {
        stdout,
        stderr: String::new(),
        exit_code: Some(0),
        variables,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Step order is whatever the prover printed, never re-sorted by name.
    #[test]
    fn proof_steps_keep_emission_order(
        ids in proptest::collection::hash_set(0u32..10_000, 0..24)
            .prop_map(|s| s.into_iter().collect::<Vec<_>>())
            .prop_shuffle(),
        split_lines in any::<bool>(),
    ) {
        let mut stdout = String::from("% SZS status Theorem for q\n% SZS output start Proof for q\n");
        for id in &ids {
            if split_lines {
                stdout.push_str(&format!("fof(f{id},plain,(\n  s__p(s__C{id}))).\n"));
            } else {
                stdout.push_str(&format!("fof(f{id},plain,s__p(s__C{id})).\n"));
            }
        }
        stdout.push_str("% SZS output end Proof for q\n");

        let parsed = interpret(&output(stdout, vec![]), &SolverLimits::default()).unwrap();
        let seen: Vec<u32> = parsed
            .proof
            .iter()
            .map(|step| {
                let name = step.trim_start_matches("fof(f");
                name[..name.find(',').unwrap()].parse().unwrap()
            })
            .collect();
        prop_assert_eq!(seen, ids);
    }

    /// Only solved positions produce bindings; nothing maps to an empty value.
    #[test]
    fn bindings_cover_exactly_the_solved_variables(
        solved in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let variables: Vec<String> = (0..solved.len()).map(|i| format!("V{i}")).collect();
        let terms: Vec<String> = solved
            .iter()
            .enumerate()
            .map(|(i, s)| if *s { format!("s__Term{i}") } else if i % 2 == 0 { "_".to_string() } else { format!("X{i}") })
            .collect();
        let stdout = format!("% SZS answers Tuple [[{}]|_] for q\n", terms.join(","));

        let parsed = interpret(&output(stdout, variables.clone()), &SolverLimits::default()).unwrap();
        for (i, var) in variables.iter().enumerate() {
            if solved[i] {
                let expected = format!("Term{i}");
                prop_assert_eq!(parsed.bindings.get(var).map(String::as_str), Some(expected.as_str()));
            } else {
                prop_assert!(!parsed.bindings.contains_key(var));
            }
        }
        prop_assert!(parsed.bindings.values().all(|v| !v.is_empty()));
    }
}
