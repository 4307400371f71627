mod archive;
mod cleanup;
mod http;
mod identity;
mod soft_delete;
mod upload;
