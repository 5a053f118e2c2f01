pub mod remote_user;
