fn main() {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }
    tonic_build::configure()
        .build_server(false)
        .compile(&["proto/otlp_logs.proto"], &["proto"])
        .expect("failed to compile otlp_logs.proto");
}
