// Integration tests follow the organization suggested by Matklad:
// https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod event_dependencies;
mod event_lifecycle;
mod simulation_scheduling;
