fn main() {
    cmacro::cli::run();
}
