fn main() {
    std::process::exit(tagsweep_lib::run());
}
