//! Workspace-level end-to-end scenarios: a real registry on an ephemeral
//! port, real participants, real TCP in between.

mod specs {
    mod prelude;

    mod can_loopback;
    mod deterministic_sim;
    mod different_periods;
    mod lin_go_to_sleep;
    mod service_removal;
    mod state_machine;
}
