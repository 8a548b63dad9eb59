//! Tests driving real child processes through the server facade.

mod fake_server;
mod instance_test;
mod protocol_test;
