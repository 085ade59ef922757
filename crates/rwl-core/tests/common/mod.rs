pub mod fake_worker;
