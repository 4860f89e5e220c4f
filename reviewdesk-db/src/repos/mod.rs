//! Repository modules for database operations

pub mod customers;
pub mod requests;

pub use customers::CustomerRepository;
pub use requests::RequestRepository;
